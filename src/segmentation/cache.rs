use super::catalog::ModelKind;
use super::types::SegmentationModel;
use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A loaded model shared between requests; inference on it is exclusive
pub type SharedModel = Arc<Mutex<Box<dyn SegmentationModel + Send>>>;

/// Creates segmentation models on a cache miss
pub trait ModelLoader {
    fn load(&self, kind: ModelKind) -> Result<Box<dyn SegmentationModel + Send>>;
}

/// Loads ONNX weights from a local model directory, fetching them when missing
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    model_dir: PathBuf,
    allow_download: bool,
}

impl OnnxModelLoader {
    pub fn new<P: Into<PathBuf>>(model_dir: P, allow_download: bool) -> Self {
        Self {
            model_dir: model_dir.into(),
            allow_download,
        }
    }

    /// `~/.u2net`, the directory rembg-style tools share
    pub fn default_model_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".u2net")
    }

    pub fn model_path(&self, kind: ModelKind) -> PathBuf {
        self.model_dir.join(kind.file_name())
    }

    fn ensure_model_file(&self, kind: ModelKind) -> Result<PathBuf> {
        let path = self.model_path(kind);
        if path.is_file() {
            return Ok(path);
        }

        if !self.allow_download {
            bail!(
                "Model file {} is missing and downloads are disabled",
                path.display()
            );
        }

        fs::create_dir_all(&self.model_dir).with_context(|| {
            format!("Failed to create model directory {}", self.model_dir.display())
        })?;
        download_model(&kind.download_url(), &path)?;
        Ok(path)
    }
}

impl Default for OnnxModelLoader {
    fn default() -> Self {
        Self::new(Self::default_model_dir(), true)
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self, kind: ModelKind) -> Result<Box<dyn SegmentationModel + Send>> {
        let path = self.ensure_model_file(kind)?;
        super::create_model(kind, &path)
    }
}

fn download_model(url: &str, destination: &Path) -> Result<()> {
    tracing::info!(
        "Downloading model from {} (first use, this may take a while)",
        url
    );

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(600))
        .build()?;

    let mut response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("Failed to download {}", url))?;

    // Write next to the destination so a partial download never looks complete
    let partial = destination.with_extension("onnx.part");
    let mut file = File::create(&partial)
        .with_context(|| format!("Failed to create {}", partial.display()))?;
    let bytes = response
        .copy_to(&mut file)
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    drop(file);

    fs::rename(&partial, destination)
        .with_context(|| format!("Failed to move model into {}", destination.display()))?;

    tracing::info!("Saved {} bytes to {}", bytes, destination.display());
    Ok(())
}

/// Process-lifetime table of loaded models, keyed by model kind
///
/// Population happens under the table lock, so concurrent requests for the
/// same model load it exactly once.
pub struct SessionCache<L> {
    loader: L,
    sessions: Mutex<HashMap<ModelKind, SharedModel>>,
}

impl<L: ModelLoader> SessionCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached model for `kind`, loading it on first use
    pub fn get_or_load(&self, kind: ModelKind) -> Result<SharedModel> {
        let mut sessions = self.lock()?;

        if let Some(model) = sessions.get(&kind) {
            tracing::debug!("Reusing cached {} session", kind);
            return Ok(Arc::clone(model));
        }

        tracing::info!("Loading model: {} ...", kind);
        let model: SharedModel = Arc::new(Mutex::new(
            self.loader
                .load(kind)
                .with_context(|| format!("Failed to load model {}", kind))?,
        ));
        sessions.insert(kind, Arc::clone(&model));

        Ok(model)
    }

    pub fn contains(&self, kind: ModelKind) -> bool {
        self.lock().map(|s| s.contains_key(&kind)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ModelKind, SharedModel>>> {
        self.sessions
            .lock()
            .map_err(|_| anyhow!("model session cache lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::Matte;
    use image::{GrayImage, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Blank;

    impl SegmentationModel for Blank {
        fn segment(&mut self, frame: &RgbImage) -> Result<Matte> {
            Ok(GrayImage::new(frame.width(), frame.height()))
        }

        fn input_size(&self) -> (u32, u32) {
            (8, 8)
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, kind: ModelKind) -> Result<Box<dyn SegmentationModel + Send>> {
            if kind == ModelKind::U2NetClothSeg {
                bail!("weights unavailable");
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Blank))
        }
    }

    #[test]
    fn loads_each_model_once() {
        let cache = SessionCache::new(CountingLoader::default());

        let first = cache.get_or_load(ModelKind::U2Net).unwrap();
        let second = cache.get_or_load(ModelKind::U2Net).unwrap();
        cache.get_or_load(ModelKind::IsNetAnime).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(ModelKind::IsNetAnime));
        assert!(!cache.contains(ModelKind::Silueta));
    }

    #[test]
    fn failed_load_is_not_cached() {
        let cache = SessionCache::new(CountingLoader::default());

        let err = cache.get_or_load(ModelKind::U2NetClothSeg).err().unwrap();

        assert!(format!("{:#}", err).contains("weights unavailable"));
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_requests_share_one_load() {
        let cache = Arc::new(SessionCache::new(CountingLoader::default()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_load(ModelKind::U2NetP).map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(cache.loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_file_without_download_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = OnnxModelLoader::new(dir.path(), false);

        let err = loader.load(ModelKind::U2Net).err().unwrap();

        assert!(err.to_string().contains("downloads are disabled"));
        assert_eq!(loader.model_path(ModelKind::U2Net), dir.path().join("u2net.onnx"));
    }
}
