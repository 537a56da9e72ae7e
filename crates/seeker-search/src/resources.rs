//! Load-once corpus resources.
//!
//! The embedding model, the corpus matrix and the question texts are each
//! held in a single-assignment cell: the first caller loads, concurrent
//! callers block on that load, everybody afterwards gets the same instance.
//! A failed load leaves the cell empty and the error goes to the caller.

use anyhow::Result;
use candle_core::Tensor;
use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};
use tracing::{debug, info};

use seeker_core::config::{DataSettings, ModelSettings, Settings};
use seeker_core::traits::Embedder;
use seeker_core::types::CorpusStats;
use seeker_embed::get_default_embedder;

use crate::npy::{load_embedding_matrix, load_question_texts};
use crate::search::normalize_corpus;

pub type ModelLoader = Box<dyn Fn(&ModelSettings) -> Result<Box<dyn Embedder>> + Send + Sync>;

/// Size and modification time of a file at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    pub path: PathBuf,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileStamp {
    pub fn capture(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self { path: path.to_path_buf(), len: meta.len(), modified: meta.modified().ok() })
    }

    pub fn is_stale(&self) -> bool {
        FileStamp::capture(&self.path).as_ref() != Some(self)
    }
}

struct Loaded<T> {
    value: T,
    stamp: Option<FileStamp>,
}

pub struct Resources {
    data: DataSettings,
    model_settings: ModelSettings,
    model_loader: ModelLoader,
    model: OnceCell<Box<dyn Embedder>>,
    embeddings: OnceCell<Loaded<Tensor>>,
    questions: OnceCell<Loaded<Vec<String>>>,
}

impl Resources {
    /// Resources backed by the configured model (or the fake one when requested).
    pub fn new(settings: &Settings) -> Self {
        Self::with_model_loader(settings, Box::new(get_default_embedder))
    }

    pub fn with_model_loader(settings: &Settings, model_loader: ModelLoader) -> Self {
        Self {
            data: settings.data.clone(),
            model_settings: settings.model.clone(),
            model_loader,
            model: OnceCell::new(),
            embeddings: OnceCell::new(),
            questions: OnceCell::new(),
        }
    }

    /// Resources whose model is already loaded.
    pub fn with_embedder(settings: &Settings, embedder: Box<dyn Embedder>) -> Self {
        let resources = Self::with_model_loader(
            settings,
            Box::new(|s: &ModelSettings| -> Result<Box<dyn Embedder>> {
                Err(anyhow::anyhow!("model '{}' was injected and cannot be reloaded", s.id))
            }),
        );
        // Fresh cell, cannot already be set.
        let _ = resources.model.set(embedder);
        resources
    }

    pub fn load_model(&self) -> Result<&dyn Embedder> {
        let model = self.model.get_or_try_init(|| {
            let start = Instant::now();
            let model = (self.model_loader)(&self.model_settings)?;
            info!("🧠 Model {} ready in {:.2?} (dim={})", model.model_id(), start.elapsed(), model.dim());
            Ok::<_, anyhow::Error>(model)
        })?;
        Ok(model.as_ref())
    }

    /// The corpus matrix with every row L2-normalized.
    pub fn load_embeddings(&self) -> Result<&Tensor> {
        let loaded = self.embeddings.get_or_try_init(|| {
            let path = &self.data.embeddings_path;
            let start = Instant::now();
            let stamp = FileStamp::capture(path);
            let value = normalize_corpus(&load_embedding_matrix(path)?)?;
            info!("📊 Loaded embeddings {:?} from {} in {:.2?}", value.dims(), path.display(), start.elapsed());
            Ok::<_, anyhow::Error>(Loaded { value, stamp })
        })?;
        Ok(&loaded.value)
    }

    pub fn load_question_data(&self) -> Result<&[String]> {
        let loaded = self.questions.get_or_try_init(|| {
            let path = &self.data.question_data_path;
            let start = Instant::now();
            let stamp = FileStamp::capture(path);
            let value = load_question_texts(path)?;
            info!("📚 Loaded {} questions from {} in {:.2?}", value.len(), path.display(), start.elapsed());
            Ok::<_, anyhow::Error>(Loaded { value, stamp })
        })?;
        Ok(&loaded.value)
    }

    /// Load all three resources up front.
    pub fn warm_up(&self) -> Result<()> {
        self.load_embeddings()?;
        self.load_question_data()?;
        self.load_model()?;
        Ok(())
    }

    pub fn stats(&self) -> Result<CorpusStats> {
        let (rows, dim) = self.load_embeddings()?.dims2()?;
        let model_id = self
            .model
            .get()
            .map_or_else(|| self.model_settings.id.clone(), |m| m.model_id().to_string());
        Ok(CorpusStats { rows, dim, model_id })
    }

    /// Data files that changed on disk since they were loaded.
    pub fn stale_files(&self) -> Vec<PathBuf> {
        let mut stale = Vec::new();
        for (stamp, path) in [
            (self.embeddings.get().map(|l| &l.stamp), &self.data.embeddings_path),
            (self.questions.get().map(|l| &l.stamp), &self.data.question_data_path),
        ] {
            let changed = match stamp {
                Some(Some(s)) => s.is_stale(),
                Some(None) => FileStamp::capture(path).is_some(),
                None => false,
            };
            if changed {
                debug!("{} changed since load", path.display());
                stale.push(path.clone());
            }
        }
        stale
    }

    /// Fresh resources over the same files, reusing the already loaded model.
    pub fn reload_data(self) -> Self {
        let Resources { data, model_settings, model_loader, model, .. } = self;
        Self { data, model_settings, model_loader, model, embeddings: OnceCell::new(), questions: OnceCell::new() }
    }
}

static SHARED: OnceCell<Resources> = OnceCell::new();

/// The process-wide instance; `settings` only matter for the first call.
pub fn shared(settings: &Settings) -> &'static Resources {
    SHARED.get_or_init(|| Resources::new(settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    use seeker_embed::FakeEmbedder;

    fn settings_in(dir: &Path) -> Settings {
        let mut s = Settings::default();
        s.data.embeddings_path = dir.join("e.npy");
        s.data.question_data_path = dir.join("q.json");
        s
    }

    fn write_corpus(dir: &Path, rows: usize) {
        let data: Vec<f32> = (0..rows * 4).map(|i| i as f32).collect();
        Tensor::from_vec(data, (rows, 4), &candle_core::Device::Cpu).unwrap().write_npy(dir.join("e.npy")).unwrap();
        let qs: Vec<String> = (0..rows).map(|i| format!("q{i}")).collect();
        fs::write(dir.join("q.json"), serde_json::to_string(&qs).unwrap()).unwrap();
    }

    #[test]
    fn model_loader_runs_once_across_threads() {
        let tmp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let resources = Resources::with_model_loader(
            &settings_in(tmp.path()),
            Box::new(move |_: &ModelSettings| -> Result<Box<dyn Embedder>> {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(20));
                Ok(Box::new(FakeEmbedder::new(4)))
            }),
        );
        let ptrs: Vec<usize> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| resources.load_model().unwrap() as *const dyn Embedder as *const () as usize))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(ptrs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn data_is_memoized() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path(), 3);
        let resources = Resources::with_embedder(&settings_in(tmp.path()), Box::new(FakeEmbedder::new(4)));
        let a = resources.load_embeddings().unwrap() as *const Tensor;
        let b = resources.load_embeddings().unwrap() as *const Tensor;
        assert_eq!(a, b);
        let qa = resources.load_question_data().unwrap().as_ptr();
        let qb = resources.load_question_data().unwrap().as_ptr();
        assert_eq!(qa, qb);
        assert_eq!(resources.stats().unwrap(), CorpusStats { rows: 3, dim: 4, model_id: seeker_embed::fake::FAKE_MODEL_ID.into() });
    }

    #[test]
    fn embeddings_are_normalized_once_at_load() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path(), 3);
        let resources = Resources::with_embedder(&settings_in(tmp.path()), Box::new(FakeEmbedder::new(4)));
        let norms: Vec<f32> = resources.load_embeddings().unwrap().sqr().unwrap().sum(1).unwrap().to_vec1().unwrap();
        // row 0 is [0, 1, 2, 3]
        assert!(norms.iter().all(|n| (n - 1.0).abs() < 1e-5), "{norms:?}");
        let row0: Vec<Vec<f32>> = resources.load_embeddings().unwrap().narrow(0, 0, 1).unwrap().to_vec2().unwrap();
        let expected = 1.0 / 14f32.sqrt();
        assert!((row0[0][1] - expected).abs() < 1e-6);
    }

    #[test]
    fn failed_load_is_reported_and_not_cached() {
        let tmp = TempDir::new().unwrap();
        let resources = Resources::with_embedder(&settings_in(tmp.path()), Box::new(FakeEmbedder::new(4)));
        assert!(resources.load_embeddings().is_err());
        write_corpus(tmp.path(), 2);
        assert_eq!(resources.load_embeddings().unwrap().dims(), &[2, 4]);
    }

    #[test]
    fn stale_files_after_rewrite_and_reload() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path(), 2);
        let resources = Resources::with_embedder(&settings_in(tmp.path()), Box::new(FakeEmbedder::new(4)));
        resources.warm_up().unwrap();
        assert!(resources.stale_files().is_empty());

        // A different length guarantees a new stamp even on coarse mtime filesystems.
        write_corpus(tmp.path(), 5);
        let stale = resources.stale_files();
        assert_eq!(stale.len(), 2);

        let resources = resources.reload_data();
        assert_eq!(resources.load_question_data().unwrap().len(), 5);
        assert!(resources.stale_files().is_empty());
        // the model survived the reload
        assert_eq!(resources.load_model().unwrap().dim(), 4);
    }

    #[test]
    fn injected_model_cannot_be_lost() {
        let tmp = TempDir::new().unwrap();
        let resources = Resources::with_embedder(&settings_in(tmp.path()), Box::new(FakeEmbedder::new(7)));
        assert_eq!(resources.load_model().unwrap().dim(), 7);
    }
}
