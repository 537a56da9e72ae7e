//! Query-side sentence embeddings.
//!
//! Loads the same sentence-transformer that produced the corpus matrix and
//! reproduces its pipeline (BERT → masked mean pooling → L2 normalization) on
//! candle. A hashing `FakeEmbedder` replaces it when `model.use_fake` or
//! `APP_USE_FAKE_EMBEDDINGS=1` is set.

use anyhow::Result;
use tracing::info;

use seeker_core::config::ModelSettings;
use seeker_core::traits::Embedder;

pub mod device;
pub mod discovery;
pub mod fake;
#[cfg(feature = "hub")]
pub mod hub;
pub mod minilm;
pub mod pool;
pub mod tokenize;

pub use fake::FakeEmbedder;
pub use minilm::MiniLmEmbedder;
pub use pool::{l2_normalize_rows, masked_mean_l2};

/// Output dimension of all-MiniLM-L6-v2.
pub const MINILM_DIM: usize = 384;

pub fn fake_requested(settings: &ModelSettings) -> bool {
    settings.use_fake
        || std::env::var("APP_USE_FAKE_EMBEDDINGS")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
}

pub fn get_default_embedder(settings: &ModelSettings) -> Result<Box<dyn Embedder>> {
    if fake_requested(settings) {
        info!("🧪 Using FakeEmbedder");
        return Ok(Box::new(FakeEmbedder::new(MINILM_DIM)));
    }
    Ok(Box::new(MiniLmEmbedder::load(settings)?))
}
