//! Filesystem tools: read, write, list, and glob

use async_trait::async_trait;
use glob::Pattern;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::traits::{input_schema_for, parse_args, Tool, ToolResult};
use crate::Result;

fn default_dot() -> String {
    ".".to_string()
}

/// Read the contents of a file
pub struct ReadFileTool {
    max_file_size: u64,
}

impl ReadFileTool {
    pub fn new(max_file_size: u64) -> Self {
        ReadFileTool { max_file_size }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ReadFileInput {
    /// Absolute or relative file path to read
    path: String,
    /// Maximum number of lines to return
    #[serde(default = "default_max_lines")]
    max_lines: usize,
    /// Line number to start reading from (0-indexed)
    #[serde(default)]
    offset: usize,
}

fn default_max_lines() -> usize {
    500
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path. Returns the file content as text with line numbers."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<ReadFileInput>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let params: ReadFileInput = parse_args(args)?;
        let path = PathBuf::from(&params.path);

        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(_) => {
                return Ok(ToolResult::failure(format!(
                    "File not found: {}",
                    path.display()
                )))
            }
        };
        if !meta.is_file() {
            return Ok(ToolResult::failure(format!("Not a file: {}", path.display())));
        }
        if meta.len() > self.max_file_size {
            return Ok(ToolResult::failure(format!(
                "File too large: {} bytes (limit {})",
                meta.len(),
                self.max_file_size
            )));
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                return Ok(ToolResult::failure(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();
        let sliced: Vec<String> = lines
            .iter()
            .skip(params.offset)
            .take(params.max_lines)
            .enumerate()
            .map(|(i, line)| format!("{:>5}| {}", params.offset + i + 1, line))
            .collect();
        let shown = sliced.len();

        let mut output = sliced.join("\n");
        if shown < total {
            output.push_str(&format!(
                "\n\n[Showing lines {}-{} of {}]",
                params.offset + 1,
                params.offset + shown,
                total
            ));
        }

        Ok(ToolResult::success(output))
    }
}

/// Write content to a file, creating parent directories as needed
pub struct WriteFileTool {
    max_file_size: u64,
}

impl WriteFileTool {
    pub fn new(max_file_size: u64) -> Self {
        WriteFileTool { max_file_size }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WriteFileInput {
    /// File path to write to
    path: String,
    /// Content to write to the file
    content: String,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text content to a file. Creates parent directories if they don't exist. Overwrites existing files."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<WriteFileInput>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let params: WriteFileInput = parse_args(args)?;
        let path = PathBuf::from(&params.path);

        if params.content.len() as u64 > self.max_file_size {
            return Ok(ToolResult::failure(format!(
                "Content too large: {} bytes (limit {})",
                params.content.len(),
                self.max_file_size
            )));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return Ok(ToolResult::failure(format!(
                        "Failed to create directories: {e}"
                    )));
                }
            }
        }

        match tokio::fs::write(&path, &params.content).await {
            Ok(()) => Ok(ToolResult::success(format!(
                "Written {} chars to {}",
                params.content.len(),
                path.display()
            ))),
            Err(e) => Ok(ToolResult::failure(format!("Write failed: {e}"))),
        }
    }
}

/// List contents of a directory
pub struct ListDirectoryTool;

#[derive(Debug, Deserialize, JsonSchema)]
struct ListDirectoryInput {
    /// Directory path to list
    #[serde(default = "default_dot")]
    path: String,
    /// Maximum number of entries to return
    #[serde(default = "default_max_entries")]
    max_entries: usize,
}

fn default_max_entries() -> usize {
    100
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List files and subdirectories in a directory. Shows file sizes and types."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<ListDirectoryInput>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let params: ListDirectoryInput = parse_args(args)?;
        let path = PathBuf::from(&params.path);

        if !path.exists() {
            return Ok(ToolResult::failure(format!(
                "Directory not found: {}",
                path.display()
            )));
        }
        if !path.is_dir() {
            return Ok(ToolResult::failure(format!(
                "Not a directory: {}",
                path.display()
            )));
        }

        let mut items: Vec<(bool, String, u64)> = Vec::new();
        let mut entries = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            items.push((
                meta.is_dir(),
                entry.file_name().to_string_lossy().to_string(),
                meta.len(),
            ));
        }
        let total = items.len();
        // Directories first, then case-insensitive by name
        items.sort_by_key(|(is_dir, name, _)| (!*is_dir, name.to_lowercase()));

        let mut lines = Vec::new();
        for (is_dir, name, size) in items.iter().take(params.max_entries) {
            if *is_dir {
                lines.push(format!("  [dir]  {name}/"));
            } else {
                lines.push(format!("  {:>8}  {}", format_size(*size), name));
            }
        }

        let mut output = format!("{}/  ({} items)\n{}", path.display(), total, lines.join("\n"));
        if total > params.max_entries {
            output.push_str(&format!(
                "\n\n[Showing {} of {} entries]",
                params.max_entries, total
            ));
        }

        Ok(ToolResult::success(output))
    }
}

fn format_size(size: u64) -> String {
    if size < 1024 {
        format!("{size}B")
    } else if size < 1024 * 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    }
}

/// Find files matching a glob pattern
pub struct GlobTool;

#[derive(Debug, Deserialize, JsonSchema)]
struct GlobInput {
    /// Glob pattern to match (e.g. '**/*.py', 'src/**/*.ts')
    pattern: String,
    /// Root directory to search from
    #[serde(default = "default_dot")]
    path: String,
    /// Maximum number of results
    #[serde(default = "default_max_results")]
    max_results: usize,
}

fn default_max_results() -> usize {
    50
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g. '**/*.py' for all Python files). Returns matching file paths."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<GlobInput>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let params: GlobInput = parse_args(args)?;
        let root = PathBuf::from(&params.path);

        if !root.exists() {
            return Ok(ToolResult::failure(format!(
                "Path not found: {}",
                root.display()
            )));
        }

        let pattern = match Pattern::new(&params.pattern) {
            Ok(pattern) => pattern,
            Err(e) => return Ok(ToolResult::failure(format!("Invalid glob pattern: {e}"))),
        };

        let result = tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = match entry.path().strip_prefix(&root) {
                    Ok(rel) => rel,
                    Err(_) => continue,
                };
                if is_hidden(rel) {
                    continue;
                }
                if pattern.matches(&path_str_for_glob(rel)) {
                    matches.push(entry.path().display().to_string());
                    if matches.len() >= params.max_results {
                        break;
                    }
                }
            }
            matches.sort();
            if matches.is_empty() {
                ToolResult::success(format!(
                    "No files matching '{}' in {}",
                    params.pattern,
                    root.display()
                ))
            } else {
                ToolResult::success(matches.join("\n"))
            }
        })
        .await
        .map_err(|e| crate::Error::Internal(format!("Glob task failed: {e}")))?;

        Ok(result)
    }
}

/// True when any path component starts with a dot
pub(crate) fn is_hidden(rel: &Path) -> bool {
    rel.components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

/// Forward slashes so Unix-style glob patterns match on all platforms
pub(crate) fn path_str_for_glob(p: &Path) -> String {
    p.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_file_numbers_lines() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "alpha\nbeta\n").await;

        let tool = ReadFileTool::new(1_048_576);
        let result = tool
            .execute(json!({"path": dir.path().join("a.txt")}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "    1| alpha\n    2| beta");
    }

    #[tokio::test]
    async fn test_read_file_window() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = (1..=10).map(|i| format!("line{i}\n")).collect();
        write(dir.path(), "b.txt", &body).await;

        let tool = ReadFileTool::new(1_048_576);
        let result = tool
            .execute(json!({
                "path": dir.path().join("b.txt"),
                "offset": 2,
                "max_lines": 3,
            }))
            .await
            .unwrap();
        assert!(result.output.starts_with("    3| line3"));
        assert!(result.output.contains("[Showing lines 3-5 of 10]"));
    }

    #[tokio::test]
    async fn test_read_missing_file_fails() {
        let tool = ReadFileTool::new(1_048_576);
        let result = tool.execute(json!({"path": "/no/such/file"})).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[tokio::test]
    async fn test_write_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/deep/out.txt");

        let tool = WriteFileTool::new(1_048_576);
        let result = tool
            .execute(json!({"path": target, "content": "payload"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(tokio::fs::read_to_string(&target).await.unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_write_rejects_oversized_content() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(8);
        let result = tool
            .execute(json!({"path": dir.path().join("x"), "content": "123456789"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Content too large"));
    }

    #[tokio::test]
    async fn test_list_directory_sorts_dirs_first() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "zzz.txt", "x").await;
        tokio::fs::create_dir(dir.path().join("aaa")).await.unwrap();

        let result = ListDirectoryTool
            .execute(json!({"path": dir.path()}))
            .await
            .unwrap();
        assert!(result.success);
        let dir_pos = result.output.find("[dir]  aaa/").unwrap();
        let file_pos = result.output.find("zzz.txt").unwrap();
        assert!(dir_pos < file_pos);
        assert!(result.output.contains("(2 items)"));
    }

    #[tokio::test]
    async fn test_glob_matches_and_skips_hidden() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.py", "x").await;
        write(dir.path(), "src/util.py", "x").await;
        write(dir.path(), ".hidden/secret.py", "x").await;
        write(dir.path(), "README.md", "x").await;

        let result = GlobTool
            .execute(json!({"pattern": "**/*.py", "path": dir.path()}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("main.py"));
        assert!(result.output.contains("util.py"));
        assert!(!result.output.contains("secret.py"));
        assert!(!result.output.contains("README.md"));
    }

    #[tokio::test]
    async fn test_glob_no_matches_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = GlobTool
            .execute(json!({"pattern": "*.rs", "path": dir.path()}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.starts_with("No files matching"));
    }
}
