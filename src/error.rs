//! Error types of the gateway library.
//!
//! Only the two terminal conditions of the connection supervisor ever leave
//! the pipeline as an [`Error`]; every other failure is logged and absorbed
//! where it happens.

/// Represents all errors reported by the gateway library.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The heat pump closed the telemetry stream.
    #[error("End of data from {0}")]
    EndOfStream(String),

    /// Too many consecutive connection attempts failed.
    #[error("Failed to connect to {address} {failures} times in a row")]
    DialBudgetExhausted { address: String, failures: u32 },

    /// The snapshot could not be handed to the message bus.
    #[error("Cannot publish snapshot: {0}")]
    Publish(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps any publisher specific error.
    pub fn publish<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Publish(err.into())
    }
}

/// The result type for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;
