use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use atelier_core::OrderId;
use atelier_orders::PhotoRef;

/// Accepted photo content types.
pub const ACCEPTED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Largest accepted upload: 10 MiB.
pub const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PhotoUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("rejected upload: {0}")]
    Rejected(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub trait PhotoStorage: Send + Sync {
    /// Persist the upload and return a retrievable reference.
    fn store(&self, order_id: OrderId, upload: PhotoUpload) -> Result<PhotoRef, StorageError>;

    fn fetch(&self, photo: &PhotoRef) -> Result<Option<PhotoUpload>, StorageError>;

    /// Drop a stored photo that never got attached. Unknown references are ignored.
    fn discard(&self, photo: &PhotoRef) -> Result<(), StorageError>;
}

impl<S> PhotoStorage for Arc<S>
where
    S: PhotoStorage + ?Sized,
{
    fn store(&self, order_id: OrderId, upload: PhotoUpload) -> Result<PhotoRef, StorageError> {
        (**self).store(order_id, upload)
    }

    fn fetch(&self, photo: &PhotoRef) -> Result<Option<PhotoUpload>, StorageError> {
        (**self).fetch(photo)
    }

    fn discard(&self, photo: &PhotoRef) -> Result<(), StorageError> {
        (**self).discard(photo)
    }
}

pub(crate) fn validate_upload(upload: &PhotoUpload) -> Result<(), StorageError> {
    if upload.bytes.is_empty() {
        return Err(StorageError::Rejected("empty file".to_string()));
    }
    if upload.bytes.len() > MAX_PHOTO_BYTES {
        return Err(StorageError::Rejected(format!(
            "file is {} bytes, the limit is {MAX_PHOTO_BYTES}",
            upload.bytes.len()
        )));
    }
    if !ACCEPTED_CONTENT_TYPES.contains(&upload.content_type.as_str()) {
        return Err(StorageError::Rejected(format!(
            "unsupported content type {}",
            upload.content_type
        )));
    }
    Ok(())
}

fn extension(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// Photo storage keyed by `photos/<order>/<n>.<ext>`.
#[derive(Debug, Default)]
pub struct InMemoryPhotoStorage {
    inner: RwLock<HashMap<String, PhotoUpload>>,
}

impl InMemoryPhotoStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PhotoStorage for InMemoryPhotoStorage {
    fn store(&self, order_id: OrderId, upload: PhotoUpload) -> Result<PhotoRef, StorageError> {
        validate_upload(&upload)?;

        let mut photos = self
            .inner
            .write()
            .map_err(|_| StorageError::Unavailable("lock poisoned".to_string()))?;
        let prefix = format!("photos/{}/", order_id.compact());
        let taken = |n: usize| {
            let stem = format!("{prefix}{n}.");
            photos.keys().any(|k| k.starts_with(&stem))
        };
        let mut n = photos.keys().filter(|k| k.starts_with(&prefix)).count() + 1;
        while taken(n) {
            n += 1;
        }
        let key = format!("{prefix}{n}.{}", extension(&upload.content_type));

        photos.insert(key.clone(), upload);
        Ok(PhotoRef::new(key))
    }

    fn fetch(&self, photo: &PhotoRef) -> Result<Option<PhotoUpload>, StorageError> {
        let photos = self
            .inner
            .read()
            .map_err(|_| StorageError::Unavailable("lock poisoned".to_string()))?;
        Ok(photos.get(photo.as_str()).cloned())
    }

    fn discard(&self, photo: &PhotoRef) -> Result<(), StorageError> {
        let mut photos = self
            .inner
            .write()
            .map_err(|_| StorageError::Unavailable("lock poisoned".to_string()))?;
        photos.remove(photo.as_str());
        Ok(())
    }
}
