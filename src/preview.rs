use crate::guard::CandidateImage;
use axum::body::Bytes;
use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PreviewId(Uuid);

impl fmt::Display for PreviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner of the local resources backing image previews.
pub trait PreviewStore: Send + Sync {
    fn acquire(&self, image: &CandidateImage) -> PreviewId;
    fn release(&self, id: PreviewId);
    /// Where the preview can be opened from, if the store exposes one.
    fn locate(&self, _id: PreviewId) -> Option<PathBuf> {
        None
    }
}

/// Revocable reference to a preview. Released exactly once, when dropped.
pub struct PreviewHandle {
    id: PreviewId,
    store: Arc<dyn PreviewStore>,
}

impl PreviewHandle {
    pub fn acquire(store: Arc<dyn PreviewStore>, image: &CandidateImage) -> Self {
        let id = store.acquire(image);
        debug!("Acquired preview {}", id);
        Self { id, store }
    }

    pub fn id(&self) -> PreviewId {
        self.id
    }

    pub fn location(&self) -> Option<PathBuf> {
        self.store.locate(self.id)
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        debug!("Releasing preview {}", self.id);
        self.store.release(self.id);
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle").field("id", &self.id).finish()
    }
}

/// Keeps preview bytes in memory.
#[derive(Default)]
pub struct MemoryPreviews {
    live: Mutex<HashMap<PreviewId, Bytes>>,
}

impl MemoryPreviews {
    pub fn live(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or(0)
    }

    pub fn bytes(&self, id: PreviewId) -> Option<Bytes> {
        self.live.lock().ok()?.get(&id).cloned()
    }
}

impl PreviewStore for MemoryPreviews {
    fn acquire(&self, image: &CandidateImage) -> PreviewId {
        let id = PreviewId(Uuid::new_v4());
        if let Ok(mut live) = self.live.lock() {
            live.insert(id, image.data.clone());
        }
        id
    }

    fn release(&self, id: PreviewId) {
        if let Ok(mut live) = self.live.lock() {
            if live.remove(&id).is_none() {
                warn!("Preview {} released twice", id);
            }
        }
    }
}

/// Writes previews into a directory so an external viewer can open them.
pub struct DiskPreviews {
    dir: PathBuf,
    files: Mutex<HashMap<PreviewId, PathBuf>>,
}

impl DiskPreviews {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PreviewStore for DiskPreviews {
    fn acquire(&self, image: &CandidateImage) -> PreviewId {
        let id = PreviewId(Uuid::new_v4());
        let extension = Path::new(&image.name)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("img");
        let path = self.dir.join(format!("{}.{}", id, extension));
        match std::fs::write(&path, &image.data) {
            Ok(()) => {
                if let Ok(mut files) = self.files.lock() {
                    files.insert(id, path);
                }
            }
            Err(e) => warn!("Failed to write preview {:?}: {}", path, e),
        }
        id
    }

    fn release(&self, id: PreviewId) {
        let path = self.files.lock().ok().and_then(|mut files| files.remove(&id));
        if let Some(path) = path {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to remove preview {:?}: {}", path, e);
            }
        }
    }

    fn locate(&self, id: PreviewId) -> Option<PathBuf> {
        self.files.lock().ok()?.get(&id).cloned()
    }
}
