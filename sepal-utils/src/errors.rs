//! Errors generated by the IR, the analyses, and the scheduler.
use thiserror::Error;

/// Convenience alias to break lines without the `std::result` prefix.
pub type SepalResult<T> = std::result::Result<T, Error>;

/// Errors surfaced to the embedding compiler. Every failure is reported; none
/// are swallowed by the passes that produce them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required external facility (such as an LP solver backend) could not
    /// be instantiated.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// An internal invariant was violated. Scheduling reports infeasible or
    /// non-integral solver results with this kind; callers typically relax
    /// the pipeline length and retry.
    #[error("internal error: {0}")]
    Internal(String),

    /// The caller handed a malformed structure or argument to an operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub fn unavailable<S: ToString>(msg: S) -> Self {
        Error::Unavailable(msg.to_string())
    }

    pub fn internal<S: ToString>(msg: S) -> Self {
        Error::Internal(msg.to_string())
    }

    pub fn invalid_argument<S: ToString>(msg: S) -> Self {
        Error::InvalidArgument(msg.to_string())
    }
}
