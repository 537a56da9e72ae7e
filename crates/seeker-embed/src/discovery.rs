//! Model path discovery.
//!
//! Finds a local copy of the sentence-transformer across the places it is
//! usually installed, falling back to the Hugging Face Hub cache.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use seeker_core::config::ModelSettings;

pub const WEIGHT_FILES: &[&str] = &["model.safetensors", "pytorch_model.bin"];

/// Directory name a model id maps to, e.g. `all-MiniLM-L6-v2`.
pub fn model_dir_name(model_id: &str) -> &str {
    model_id.rsplit('/').next().unwrap_or(model_id)
}

/// True when `dir` holds a config, a tokenizer and one of the weight files.
pub fn has_model_files(dir: &Path) -> bool {
    dir.join("config.json").is_file()
        && dir.join("tokenizer.json").is_file()
        && WEIGHT_FILES.iter().any(|w| dir.join(w).is_file())
}

/// Resolve the model directory with priority:
/// 1. `model.dir` from configuration
/// 2. `APP_MODEL_DIR`, then `MODEL_DIR` environment variables
/// 3. `models/<name>` and `../models/<name>` relative to the working directory
/// 4. Hugging Face Hub cache, downloading if `model.allow_download` (feature `hub`)
pub fn resolve_model_dir(settings: &ModelSettings) -> Result<PathBuf> {
    if let Some(dir) = &settings.dir {
        if has_model_files(dir) { info!("📦 Using configured model dir: {}", dir.display()); return Ok(dir.clone()); }
        warn!("model.dir set but model files not found: {}", dir.display());
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if has_model_files(&p) { info!("📦 Using {}: {}", var, p.display()); return Ok(p); }
            warn!("{} set but model files not found: {}", var, dir);
        }
    }
    for candidate in local_candidates(&settings.id) {
        if has_model_files(&candidate) { info!("📦 Using model dir: {}", candidate.display()); return Ok(candidate); }
    }
    fetch_from_hub(settings)
}

fn local_candidates(model_id: &str) -> Vec<PathBuf> {
    let name = model_dir_name(model_id);
    vec![Path::new("models").join(name), Path::new("../models").join(name)]
}

#[cfg(feature = "hub")]
fn fetch_from_hub(settings: &ModelSettings) -> Result<PathBuf> {
    crate::hub::cached_or_download(&settings.id, settings.allow_download)
}

#[cfg(not(feature = "hub"))]
fn fetch_from_hub(settings: &ModelSettings) -> Result<PathBuf> {
    Err(anyhow!(
        "Could not locate model '{}'. Checked model.dir, APP_MODEL_DIR, MODEL_DIR, models/{}, ../models/{}",
        settings.id,
        model_dir_name(&settings.id),
        model_dir_name(&settings.id)
    ))
}

/// Pick the weights file inside a resolved model directory.
pub fn weights_path(dir: &Path) -> Result<PathBuf> {
    WEIGHT_FILES
        .iter()
        .map(|w| dir.join(w))
        .find(|p| p.is_file())
        .ok_or_else(|| anyhow!("No weights ({}) in {}", WEIGHT_FILES.join(" or "), dir.display()))
}
