use thiserror::Error;

/// Errors from reading or writing packed BVH files.
#[derive(Error, Debug)]
pub enum BvhError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode packed BVH: {0}")]
    Encoding(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, BvhError>;
