//! Search tools: grep over source files

use async_trait::async_trait;
use glob::Pattern;
use regex::RegexBuilder;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use walkdir::WalkDir;

use super::filesystem::is_hidden;
use super::traits::{input_schema_for, parse_args, Tool, ToolResult};
use crate::Result;

/// File extensions searched when no file pattern is given
const SEARCHABLE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "tsx", "jsx", "java", "go", "rs", "c", "cpp", "h", "hpp", "rb", "php",
    "swift", "kt", "yaml", "yml", "toml", "json", "md", "txt", "cfg", "sh", "bash", "zsh", "sql",
    "html", "css", "scss",
];

/// Search file contents for a regex pattern
pub struct GrepTool;

#[derive(Debug, Deserialize, JsonSchema)]
struct GrepInput {
    /// Regular expression pattern to search for
    pattern: String,
    /// Directory or file to search in
    #[serde(default = "default_dot")]
    path: String,
    /// Glob to filter files (e.g. '*.py')
    #[serde(default)]
    file_pattern: String,
    /// Maximum number of matching lines
    #[serde(default = "default_max_results")]
    max_results: usize,
    /// Case-insensitive search
    #[serde(default)]
    case_insensitive: bool,
}

fn default_dot() -> String {
    ".".to_string()
}

fn default_max_results() -> usize {
    50
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents for a regular expression pattern. Returns matching lines with file paths and line numbers."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<GrepInput>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let params: GrepInput = parse_args(args)?;
        let root = PathBuf::from(&params.path);

        if !root.exists() {
            return Ok(ToolResult::failure(format!(
                "Path not found: {}",
                root.display()
            )));
        }

        let regex = match RegexBuilder::new(&params.pattern)
            .case_insensitive(params.case_insensitive)
            .build()
        {
            Ok(regex) => regex,
            Err(e) => return Ok(ToolResult::failure(format!("Invalid regex: {e}"))),
        };

        let file_filter = if params.file_pattern.is_empty() {
            None
        } else {
            match Pattern::new(&params.file_pattern) {
                Ok(pattern) => Some(pattern),
                Err(e) => return Ok(ToolResult::failure(format!("Invalid file pattern: {e}"))),
            }
        };

        let result = tokio::task::spawn_blocking(move || {
            let files = if root.is_file() {
                vec![root.clone()]
            } else {
                collect_files(&root, file_filter.as_ref())
            };

            let mut matches = Vec::new();
            'outer: for file in files {
                let Ok(content) = std::fs::read_to_string(&file) else {
                    continue;
                };
                for (line_num, line) in content.lines().enumerate() {
                    if regex.is_match(line) {
                        let shown = file.strip_prefix(&root).unwrap_or(&file);
                        matches.push(format!(
                            "{}:{}: {}",
                            shown.display(),
                            line_num + 1,
                            line.trim_end()
                        ));
                        if matches.len() >= params.max_results {
                            break 'outer;
                        }
                    }
                }
            }

            if matches.is_empty() {
                ToolResult::success(format!(
                    "No matches for '{}' in {}",
                    params.pattern,
                    root.display()
                ))
            } else {
                ToolResult::success(matches.join("\n"))
            }
        })
        .await
        .map_err(|e| crate::Error::Internal(format!("Grep task failed: {e}")))?;

        Ok(result)
    }
}

/// Collect searchable files under a directory, sorted for stable output
fn collect_files(root: &PathBuf, file_filter: Option<&Pattern>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .strip_prefix(root)
                .map(|rel| !is_hidden(rel))
                .unwrap_or(false)
        })
        .filter(|e| match file_filter {
            Some(pattern) => pattern.matches(&e.file_name().to_string_lossy()),
            None => e
                .path()
                .extension()
                .map(|ext| SEARCHABLE_EXTENSIONS.contains(&ext.to_string_lossy().as_ref()))
                .unwrap_or(false),
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
