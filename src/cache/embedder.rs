//! Task-description embedders for the chain cache
//!
//! The default embedder is deterministic: identical text always maps to the
//! same vector, so exact-repeat lookups hit with similarity 1.0 even without
//! a semantic model. Real semantic embeddings come from fastembed behind the
//! `fastembed` cargo feature; nondeterministic random vectors are never used,
//! as they would silently defeat the cache.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::Result;

/// Embedding dimension used throughout the cache
pub const EMBEDDING_DIMENSION: usize = 384;

/// Produces fixed-dimension embeddings for task descriptions
pub trait Embedder: Send + Sync {
    /// Output dimension of this embedder
    fn dimension(&self) -> usize;

    /// Embed a text. Vectors need not be normalized; the cache normalizes.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic fallback embedder seeded from a hash of the text.
///
/// Carries no semantics: distinct texts land on effectively orthogonal
/// random vectors, so only near-identical task strings will match.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        HashEmbedder { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        HashEmbedder::new(EMBEDDING_DIMENSION)
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(hasher.finish());
        Ok((0..self.dimension)
            .map(|_| rng.random::<f32>() - 0.5)
            .collect())
    }
}

/// Scale a vector to unit L2 norm. Zero vectors are returned unchanged.
pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Dot product; equals cosine similarity for normalized vectors
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Semantic embedder backed by a local fastembed model (384 dimensions).
/// The model auto-downloads on first use.
#[cfg(feature = "fastembed")]
pub struct FastEmbedder {
    model: fastembed::TextEmbedding,
}

#[cfg(feature = "fastembed")]
impl FastEmbedder {
    pub fn new() -> Result<Self> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(true),
        )
        .map_err(|e| crate::Error::Internal(format!("Failed to init embedding model: {e}")))?;
        Ok(FastEmbedder { model })
    }
}

#[cfg(feature = "fastembed")]
impl Embedder for FastEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| crate::Error::Internal(format!("Embedding error: {e}")))?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| crate::Error::Internal("No embedding returned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("fix the login bug").unwrap();
        let b = embedder.embed("fix the login bug").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIMENSION);
    }

    #[test]
    fn test_distinct_texts_are_dissimilar() {
        let embedder = HashEmbedder::default();
        let a = l2_normalize(embedder.embed("fix the login bug").unwrap());
        let b = l2_normalize(embedder.embed("compile the kernel").unwrap());
        // Random unit vectors in 384 dims are near-orthogonal
        assert!(dot(&a, &b).abs() < 0.3);
    }

    #[test]
    fn test_l2_normalize_yields_unit_norm() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_unchanged() {
        let v = l2_normalize(vec![0.0, 0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_self_similarity_is_one() {
        let embedder = HashEmbedder::default();
        let v = l2_normalize(embedder.embed("rename the helper").unwrap());
        assert!((dot(&v, &v) - 1.0).abs() < 1e-5);
    }
}
