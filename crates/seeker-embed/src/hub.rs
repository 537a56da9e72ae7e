use anyhow::{anyhow, Result};
use hf_hub::{api::sync::Api, Cache};
use std::path::PathBuf;
use tracing::info;

use crate::discovery::{has_model_files, WEIGHT_FILES};

/// Snapshot directory for `model_id` in the local Hub cache, downloading the
/// missing files first when `allow_download` is set.
pub fn cached_or_download(model_id: &str, allow_download: bool) -> Result<PathBuf> {
    let cache = Cache::default().model(model_id.to_string());
    if let Some(config) = cache.get("config.json") {
        if let Some(dir) = config.parent().filter(|d| has_model_files(d)) {
            info!("📦 Using Hub cache: {}", dir.display());
            return Ok(dir.to_path_buf());
        }
    }
    if !allow_download {
        return Err(anyhow!("Model '{}' not found locally and model.allow_download is off", model_id));
    }

    info!("📥 Downloading {} from the Hugging Face Hub...", model_id);
    let repo = Api::new()?.model(model_id.to_string());
    let config = repo.get("config.json")?;
    repo.get("tokenizer.json")?;
    let mut fetched = false;
    for weights in WEIGHT_FILES {
        if repo.get(weights).is_ok() { fetched = true; break; }
    }
    if !fetched {
        return Err(anyhow!("Model '{}' has no {} on the Hub", model_id, WEIGHT_FILES.join(" or ")));
    }
    config
        .parent()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("Unexpected Hub cache layout for {}", config.display()))
}
