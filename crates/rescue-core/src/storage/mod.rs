//! Object storage backends for report attachments.

mod r2;

pub use r2::{R2BlobStore, R2Config};
