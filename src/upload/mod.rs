//! Artifact upload.
//!
//! Posts a captured image as `multipart/form-data` to an HTTP endpoint that
//! answers with the stored file's URL.

mod client;

pub use client::{
    UploadClient, UploadError, UploadReceipt, DEFAULT_UPLOAD_URL, UPLOAD_FIELD_NAME,
    UPLOAD_URL_ENV,
};
