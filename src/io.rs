use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageError, ImageFormat, RgbaImage};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use uuid::Uuid;

// ============================================================================
// SUPPORTED SOURCE FORMATS
// ============================================================================

/// Raster formats a source image may use (lowercase extensions).
/// Anything else, video containers in particular, never reaches the paint path.
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "bmp", "tga", "ico", "tif", "tiff", "gif",
];

/// Check a store name / file name against the raster allow-list.
pub fn is_supported_image(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

// ============================================================================
// ERRORS
// ============================================================================

/// Failure reported by a [`BlobStore`].
#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    Io(std::io::Error),
    /// The store refused the request (bad handle, quota, remote error, ...).
    Rejected(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(h) => write!(f, "blob not found: {}", h),
            StoreError::Io(e) => write!(f, "I/O error: {}", e),
            StoreError::Rejected(e) => write!(f, "store rejected request: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(e.to_string())
        } else {
            StoreError::Io(e)
        }
    }
}

/// Error type for everything the editor surfaces to its caller.
#[derive(Debug)]
pub enum EditorError {
    /// Source name is not a supported raster format.
    UnsupportedFormat(String),
    Decode(String),
    Encode(String),
    Store(StoreError),
    Session(String),
}

impl std::fmt::Display for EditorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditorError::UnsupportedFormat(name) => {
                write!(f, "Unsupported image format (masking needs a raster image): {}", name)
            }
            EditorError::Decode(e) => write!(f, "Decode error: {}", e),
            EditorError::Encode(e) => write!(f, "Encode error: {}", e),
            EditorError::Store(e) => write!(f, "Store error: {}", e),
            EditorError::Session(e) => write!(f, "Session error: {}", e),
        }
    }
}

impl std::error::Error for EditorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EditorError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EditorError {
    fn from(e: StoreError) -> Self {
        EditorError::Store(e)
    }
}

impl From<ImageError> for EditorError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::Encoding(_) => EditorError::Encode(e.to_string()),
            _ => EditorError::Decode(e.to_string()),
        }
    }
}

impl From<Box<bincode::ErrorKind>> for EditorError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        EditorError::Session(e.to_string())
    }
}

// ============================================================================
// BLOB STORE CONTRACT
// ============================================================================

/// Opaque remote store for source images and mask PNGs.
///
/// Calls block; the editor only ever invokes them from background jobs.
/// Timeouts are the store's responsibility.
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` and return the handle that names them.
    fn upload(&self, bytes: Vec<u8>) -> Result<String, StoreError>;
    /// Fetch the bytes previously stored under `handle`.
    fn fetch(&self, handle: &str) -> Result<Vec<u8>, StoreError>;
}

/// Directory-backed store used by the headless CLI.
/// Uploads are written as `<prefix>_<uuid>.png` inside `root`.
pub struct DirStore {
    root: PathBuf,
    prefix: String,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    /// Resolve a handle inside the store root, refusing anything that would escape it.
    fn resolve(&self, handle: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(handle);
        let escapes = rel.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_) | std::path::Component::CurDir)
        });
        if handle.is_empty() || escapes {
            return Err(StoreError::Rejected(format!("invalid handle '{}'", handle)));
        }
        Ok(self.root.join(rel))
    }
}

impl BlobStore for DirStore {
    fn upload(&self, bytes: Vec<u8>) -> Result<String, StoreError> {
        fs::create_dir_all(&self.root)?;
        let name = format!("{}_{}.png", self.prefix, Uuid::new_v4().simple());
        fs::write(self.root.join(&name), bytes)?;
        Ok(name)
    }

    fn fetch(&self, handle: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(handle)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(handle.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

/// In-process store, handy for embedding hosts that persist elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a blob under a fixed handle.
    pub fn insert(&self, handle: impl Into<String>, bytes: Vec<u8>) {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.insert(handle.into(), bytes);
        }
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryStore {
    fn upload(&self, bytes: Vec<u8>) -> Result<String, StoreError> {
        let name = format!("mask_{}.png", Uuid::new_v4().simple());
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| StoreError::Rejected("store lock poisoned".to_string()))?;
        blobs.insert(name.clone(), bytes);
        Ok(name)
    }

    fn fetch(&self, handle: &str) -> Result<Vec<u8>, StoreError> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| StoreError::Rejected("store lock poisoned".to_string()))?;
        blobs
            .get(handle)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(handle.to_string()))
    }
}

// ============================================================================
// CODECS
// ============================================================================

/// Encode an RGBA buffer as a lossless PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, EditorError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(EditorError::Encode("cannot encode a zero-size image".to_string()));
    }
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgba8,
    )?;
    Ok(out)
}

/// Decode a PNG (mask or history snapshot) into RGBA.
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, EditorError> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.into_rgba8())
}

/// Decode any supported source image into RGBA, guessing the format from content.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, EditorError> {
    Ok(image::load_from_memory(bytes)?.into_rgba8())
}

// ============================================================================
// BACKGROUND JOB RESULTS
// ============================================================================

/// Results sent back from `rayon::spawn` jobs to the thread that owns the
/// project.  Every result carries the image generation it was started under
/// so stale completions can be dropped.
pub enum IoResult {
    ImageLoaded {
        generation: u64,
        name: String,
        result: Result<RgbaImage, EditorError>,
    },
    MaskLoaded {
        generation: u64,
        handle: String,
        result: Result<RgbaImage, EditorError>,
    },
    MaskUploaded {
        generation: u64,
        result: Result<String, StoreError>,
    },
}
