/**
 * File Uploads
 * Local-disk storage for uploaded images
 */
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const DEFAULT_UPLOAD_ROOT: &str = "public/img";
const DEFAULT_MAX_FILE_SIZE: usize = 5 * 1024 * 1024; // 5MB
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("empty file")]
    EmptyFile,
    #[error("file too large: {size} bytes (maximum {max})")]
    TooLarge { size: usize, max: usize },
    #[error("unsupported file type `{0}`. Allowed: JPEG, PNG, WebP, GIF")]
    UnsupportedType(String),
    #[error("file content does not match an allowed image type")]
    UnrecognisedContent,
    #[error("invalid filename `{0}`")]
    InvalidFilename(String),
}

/// A file received from a form submission.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub root: PathBuf,
    pub max_file_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            root: std::env::var("UPLOAD_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOAD_ROOT)),
            max_file_size: std::env::var("UPLOAD_MAX_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_FILE_SIZE),
        }
    }
}

/// Storage for uploaded files, addressed by a logical base path.
#[async_trait]
pub trait FileUploads: Send + Sync {
    /// Check that `file` would be accepted by `upload` without storing it.
    fn validate(&self, file: &UploadedFile) -> Result<(), UploadError>;

    /// Store `file` under `base_path` and return the stored filename.
    async fn upload(&self, file: &UploadedFile, base_path: &str) -> Result<String, UploadError>;

    /// Remove a stored file. `Ok(false)` when there was nothing to remove.
    async fn delete(&self, path: &Path) -> Result<bool, UploadError>;

    /// Directory that files uploaded under `base_path` end up in.
    fn directory(&self, base_path: &str) -> PathBuf;
}

#[derive(Debug, Clone)]
pub struct LocalFileUploads {
    config: UploadConfig,
}

impl LocalFileUploads {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    /// Extension, size and content checks. Returns the detected MIME type.
    fn check_image(&self, file: &UploadedFile) -> Result<&'static str, UploadError> {
        let original_ext = file
            .file_name
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_lowercase();
        if !ALLOWED_EXTENSIONS.contains(&original_ext.as_str()) {
            return Err(UploadError::UnsupportedType(original_ext));
        }

        if file.bytes.is_empty() {
            return Err(UploadError::EmptyFile);
        }
        if file.bytes.len() > self.config.max_file_size {
            return Err(UploadError::TooLarge {
                size: file.bytes.len(),
                max: self.config.max_file_size,
            });
        }

        validate_image_magic_bytes(&file.bytes).ok_or(UploadError::UnrecognisedContent)
    }
}

fn validate_image_magic_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

fn get_extension_from_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.contains('\\')
        && !name.contains('\0')
        && !name.starts_with('/')
}

#[async_trait]
impl FileUploads for LocalFileUploads {
    fn validate(&self, file: &UploadedFile) -> Result<(), UploadError> {
        self.check_image(file).map(|_| ())
    }

    async fn upload(&self, file: &UploadedFile, base_path: &str) -> Result<String, UploadError> {
        if !is_safe_component(base_path) {
            return Err(UploadError::InvalidFilename(base_path.to_string()));
        }

        let mime_type = self.check_image(file)?;

        let directory = self.directory(base_path);
        tokio::fs::create_dir_all(&directory).await?;

        let filename = format!("{}.{}", Uuid::new_v4(), get_extension_from_mime(mime_type));
        tokio::fs::write(directory.join(&filename), &file.bytes).await?;

        tracing::info!(
            base_path = %base_path,
            filename = %filename,
            size = file.bytes.len(),
            "image uploaded"
        );
        Ok(filename)
    }

    async fn delete(&self, path: &Path) -> Result<bool, UploadError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "file deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "file already absent");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn directory(&self, base_path: &str) -> PathBuf {
        self.config.root.join(base_path)
    }
}
