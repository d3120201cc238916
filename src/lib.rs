pub mod config;
pub mod corpus;
pub mod driver;
pub mod storage;

// Re-export vision types for convenience
pub use facecrop_vision::{
    overlay, pipeline, synth, DetectorParams, FaceDetector, Perturbation, RandomSampler, Rect,
    SynthesisParams, YunetDetector,
};
