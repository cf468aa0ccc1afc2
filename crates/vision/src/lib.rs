//! Vision-region extraction: task taxonomy, weight caching, and
//! bbox/polygon rasterization over a pluggable inference backend.

pub mod backend;
pub mod error;
pub mod extractor;
pub mod font;
pub mod raster;
pub mod task;
pub mod weights;

#[cfg(any(feature = "mock", test))]
pub mod mock;

pub use backend::{BackendError, GenerationParams, Predictions, VisionBackend, GENERATION};
pub use error::VisionError;
pub use extractor::{ExtractRequest, Extraction, RegionExtractor};
pub use task::{Attention, Precision, TaskMode, VisionTask, MODEL_ALLOWLIST};
