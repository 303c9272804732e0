//! Command handler modules for the `blr` binary.
//!
//! Shared utilities used by multiple command paths live here.

pub mod normalize;
pub mod reconcile;

use anyhow::{Context, Result};
use blr_config::LoadedConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    blr_config::load_layered_yaml(&path_refs)
}

pub fn open_input(path: &Path, what: &str) -> Result<BufReader<File>> {
    let f = File::open(path).with_context(|| format!("open {what} failed: {}", path.display()))?;
    Ok(BufReader::new(f))
}
