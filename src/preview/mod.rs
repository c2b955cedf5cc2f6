//! Live preview streaming.
//!
//! [`PreviewStream`] polls a connected session for preview frames on a
//! [`RepeatingTask`] and keeps the latest one behind an object handle.

mod stream;
mod task;

pub use stream::{PreviewStream, StreamState, DEFAULT_PREVIEW_INTERVAL};
pub use task::{RepeatingTask, TickControl};
