//! cxxscrape — C++ binding source → flat C ABI IR extractor.
//!
//! Parses a user-authored binding source (ordinary C++ that names classes,
//! functions, enums and `std::function` specializations through the `cxs`
//! marker constructs) together with the underlying library headers via
//! libclang, and populates a [`Context`] with a language-neutral model of
//! every bound entity for downstream C-API emitters.
//!
//! # Quick start
//!
//! Extract bindings from a config and write the rendered model (suitable for
//! `build.rs` or golden-file tooling):
//!
//! ```no_run
//! use std::path::Path;
//!
//! // Reads cxxscrape.toml, parses the binding sources, writes the dump.
//! cxxscrape::run(Path::new("cxxscrape.toml"), None).unwrap();
//! ```
//!
//! Or drive the extraction directly with a compiler-style command line:
//!
//! ```no_run
//! let args: Vec<String> = ["bind_points.cpp", "-Iinclude", "-std=c++17"]
//!     .iter()
//!     .map(|s| s.to_string())
//!     .collect();
//! let ctx = cxxscrape::Context::compile_and_extract(&args).unwrap();
//! for (_, module) in ctx.modules() {
//!     println!("{}", ctx.module_to_string(module));
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use tracing::info;

pub mod config;
pub mod context;
pub mod error;
pub mod model;

mod extract;
mod matcher;
mod print;

pub use context::Context;
pub use error::ExtractError;

/// Run the full pipeline: load config, parse the binding sources, extract,
/// and write the rendered model to the output file.
///
/// `config_path` is the path to a `cxxscrape.toml` file.
/// `output` optionally overrides the output file path from the config.
///
/// Returns the path the dump was written to.
pub fn run(config_path: &Path, output: Option<&Path>) -> Result<PathBuf> {
    let cfg = config::load_config(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let dump = generate_from_config(&cfg, base_dir)?;

    let output_path = match output {
        Some(p) => p.to_path_buf(),
        None => base_dir.join(&cfg.output.file),
    };
    std::fs::write(&output_path, &dump)
        .with_context(|| format!("writing output to {}", output_path.display()))?;

    info!(
        path = %output_path.display(),
        size = dump.len(),
        "wrote bindings"
    );

    Ok(output_path)
}

/// Parse a `cxxscrape.toml` config file, extract the bindings, and return
/// the rendered model without writing to disk.
pub fn generate(config_path: &Path) -> Result<String> {
    let cfg = config::load_config(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    generate_from_config(&cfg, base_dir)
}

/// Render the bindings extracted from an already-loaded [`config::Config`].
pub fn generate_from_config(cfg: &config::Config, base_dir: &Path) -> Result<String> {
    let ctx = extract_from_config(cfg, base_dir)?;
    Ok(ctx.dump())
}

/// Extract a [`Context`] from an already-loaded [`config::Config`].
///
/// `base_dir` is the directory relative to which source paths in the config
/// are resolved (typically the parent directory of the TOML file).
pub fn extract_from_config(cfg: &config::Config, base_dir: &Path) -> Result<Context> {
    let args = cfg.command_line(base_dir);
    info!(sources = cfg.sources.len(), "loaded configuration");
    let ctx = Context::compile_and_extract(&args)?;
    Ok(ctx)
}
