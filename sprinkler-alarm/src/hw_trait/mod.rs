//! Hardware abstraction traits.
//!
//! The alarm core only sees these traits. Concrete drivers live in
//! [`crate::gpio`].

pub mod gpio;

/// Errors raised by hardware drivers.
#[derive(Debug, thiserror::Error)]
pub enum HwError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("pin {0} is not configured for this operation")]
    WrongMode(u8),
}

pub type Result<T> = std::result::Result<T, HwError>;
