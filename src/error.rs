use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpacemapError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("out of space: no free run can serve {requested} bytes")]
    OutOfSpace { requested: i64 },

    #[error("image size mismatch: expected {expected} bytes, got {actual}")]
    ImageSizeMismatch { expected: u64, actual: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SpacemapError>;
