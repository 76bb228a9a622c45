//! Configuration types for `cxxscrape.toml`.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub output: OutputConfig,
    /// Additional directories to search when resolving source paths. Each
    /// entry is tried in order after `base_dir` (the TOML file's parent
    /// directory). Also injected as `-I` flags for clang.
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,
    /// Binding source files, parsed as translation units in order.
    pub sources: Vec<PathBuf>,
    /// Extra clang arguments (e.g. `-std=c++17`).
    #[serde(default)]
    pub clang_args: Vec<String>,
}

/// Output file settings.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output file path for the rendered bindings.
    #[serde(default = "default_output_file")]
    pub file: PathBuf,
}

fn default_output_file() -> PathBuf {
    PathBuf::from("bindings.ir")
}

impl Config {
    /// Assemble the compiler-style command line: resolved sources first, then
    /// `-I` flags for every include path, then the user's clang arguments.
    pub fn command_line(&self, base_dir: &Path) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        for source in &self.sources {
            args.push(
                resolve_source(source, base_dir, &self.include_paths)
                    .display()
                    .to_string(),
            );
        }
        for include in &self.include_paths {
            let resolved = if include.is_absolute() {
                include.clone()
            } else {
                base_dir.join(include)
            };
            let flag = format!("-I{}", resolved.display());
            if !args.contains(&flag) {
                args.push(flag);
            }
        }
        args.extend(self.clang_args.iter().cloned());
        args
    }
}

/// Resolve a source path by searching `base_dir` first, then each
/// `include_paths` entry. Absolute paths are returned as-is. If the file is
/// not found anywhere, falls back to `base_dir.join(path)` so the caller
/// gets a meaningful error from clang.
pub fn resolve_source(path: &Path, base_dir: &Path, include_paths: &[PathBuf]) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let candidate = base_dir.join(path);
    if candidate.exists() {
        return candidate;
    }
    for include in include_paths {
        let candidate = include.join(path);
        if candidate.exists() {
            return candidate;
        }
    }
    base_dir.join(path)
}

/// Load and parse a `cxxscrape.toml` configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {}", path.display(), e))?;
    Ok(config)
}
