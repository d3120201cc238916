pub mod detector;
pub mod error;
pub mod face;
pub mod geometry;
pub mod model;
pub mod overlay;
pub mod pipeline;
pub mod synth;
pub mod yunet;

// Re-export commonly used types
pub use detector::{DetectorParams, FaceDetector};
pub use error::ParamsError;
pub use face::YunetDetector;
pub use geometry::Rect;
pub use pipeline::{ImageOutcome, Pipeline};
pub use synth::{Crop, Perturbation, Placement, RandomSampler, Sampler, SynthesisParams};
