use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("{name} must be a finite number, got {value}")]
    NotFinite { name: &'static str, value: f64 },

    #[error("resize_min must be >= 0, got {0}")]
    NegativeResize(f64),

    #[error("resize_min ({min}) must not exceed resize_max ({max})")]
    ResizeRange { min: f64, max: f64 },

    #[error("offset_max must be >= 0, got {0}")]
    NegativeOffset(f64),

    #[error("scale_factor must be > 1.0, got {0}")]
    ScaleFactor(f64),

    #[error("{name} must be within [0, 1], got {value}")]
    Threshold { name: &'static str, value: f32 },

    #[error("sampling_frequency must be > 0")]
    SamplingFrequency,

    #[error("normalize_size must be > 0")]
    NormalizeSize,
}
