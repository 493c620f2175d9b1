//! Outbound collaborators: e-mail delivery, photo storage, document rendering.
//!
//! Each is a narrow trait with an in-process adapter. Services depend on the
//! traits only.

pub mod notifier;
pub mod renderer;
pub mod storage;

pub use notifier::{Attachment, Delivered, LogNotifier, Notification, Notifier, NotifyError, RecordingNotifier};
pub use renderer::{DocumentRenderer, PlainTextRenderer, RenderError, RenderedDocument};
pub use storage::{InMemoryPhotoStorage, PhotoStorage, PhotoUpload, StorageError};
