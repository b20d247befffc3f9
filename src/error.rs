//! Error types for bosscore
//!
//! Every failure is scoped to a single request. The core never formats a
//! transport response; callers translate [`ErrorKind`] into one using
//! [`ErrorKind::code`] and [`ErrorKind::status`].

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// bosscore error types
#[derive(Error, Debug)]
pub enum Error {
    /// A range was reversed, empty, or not of the form `start:stop`
    #[error("Malformed range: {0}")]
    MalformedRange(String),

    /// A range falls outside the coordinate frame at the requested resolution
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// Unknown collection, experiment, channel, view token, or metadata key
    #[error("Not found: {0}")]
    NotFound(String),

    /// A required query parameter was absent
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    /// Metadata create collided with an existing key
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Entity name cannot be encoded into a boss key
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Cutout payload does not decode to the addressed extent
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Coordinate frame declaration violates its invariants
    #[error("Invalid coordinate frame: {0}")]
    InvalidFrame(String),

    /// Operation is not defined for this resource
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Engine configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Backing store I/O failure (never retried inside the core)
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Stored record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Discriminant of [`Error`] carrying the stable code and status class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::MalformedRange`]
    MalformedRange,
    /// See [`Error::OutOfBounds`]
    OutOfBounds,
    /// See [`Error::NotFound`]
    NotFound,
    /// See [`Error::MissingArgument`]
    MissingArgument,
    /// See [`Error::AlreadyExists`]
    AlreadyExists,
    /// See [`Error::InvalidName`]
    InvalidName,
    /// See [`Error::InvalidPayload`]
    InvalidPayload,
    /// See [`Error::InvalidFrame`]
    InvalidFrame,
    /// See [`Error::MethodNotAllowed`]
    MethodNotAllowed,
    /// See [`Error::InvalidConfig`]
    InvalidConfig,
    /// See [`Error::BackendUnavailable`]
    BackendUnavailable,
}

impl ErrorKind {
    /// Stable numeric error code.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::MissingArgument => 30000,
            Self::MalformedRange => 30001,
            Self::OutOfBounds => 30002,
            Self::InvalidName => 30003,
            Self::InvalidPayload => 30004,
            Self::InvalidFrame => 30005,
            Self::AlreadyExists => 30006,
            Self::InvalidConfig => 30007,
            Self::NotFound => 30404,
            Self::MethodNotAllowed => 30405,
            Self::BackendUnavailable => 30500,
        }
    }

    /// HTTP-style status class.
    #[must_use]
    pub const fn status(self) -> u16 {
        match self {
            Self::MissingArgument
            | Self::MalformedRange
            | Self::OutOfBounds
            | Self::InvalidName
            | Self::InvalidPayload
            | Self::InvalidFrame
            | Self::AlreadyExists => 400,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::InvalidConfig => 500,
            Self::BackendUnavailable => 503,
        }
    }
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedRange(_) => ErrorKind::MalformedRange,
            Self::OutOfBounds(_) => ErrorKind::OutOfBounds,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::MissingArgument(_) => ErrorKind::MissingArgument,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::InvalidName(_) => ErrorKind::InvalidName,
            Self::InvalidPayload(_) => ErrorKind::InvalidPayload,
            Self::InvalidFrame(_) => ErrorKind::InvalidFrame,
            Self::MethodNotAllowed(_) => ErrorKind::MethodNotAllowed,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::BackendUnavailable(_) | Self::Serialization(_) => ErrorKind::BackendUnavailable,
        }
    }

    /// Shorthand for `self.kind().code()`.
    #[must_use]
    pub const fn code(&self) -> u32 {
        self.kind().code()
    }

    /// Shorthand for `self.kind().status()`.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.kind().status()
    }
}
