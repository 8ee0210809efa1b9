use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the ifdd crate
#[derive(Error, Debug)]
pub enum FddError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("State value {value} in dimension {dim} is outside [{min}, {max}]")]
    StateOutOfBounds {
        dim: usize,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("IO error: {source}")]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("{0}")]
    Other(String),
}

impl FddError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a new out-of-bounds error for a state component
    pub fn state_out_of_bounds(dim: usize, value: f64, min: f64, max: f64) -> Self {
        Self::StateOutOfBounds {
            dim,
            value,
            min,
            max,
        }
    }

    /// Create a new IO error with path context
    pub fn io_error(err: std::io::Error, path: Option<impl Into<PathBuf>>) -> Self {
        Self::Io {
            source: err,
            path: path.map(|p| p.into()),
        }
    }

    /// Create a new parse error
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether this error was raised while validating a configuration
    pub fn is_config(&self) -> bool {
        matches!(self, FddError::Config { .. })
    }
}

impl From<std::io::Error> for FddError {
    fn from(error: std::io::Error) -> Self {
        FddError::io_error(error, None::<PathBuf>)
    }
}

impl From<serde_json::Error> for FddError {
    fn from(error: serde_json::Error) -> Self {
        FddError::parse_error(error.to_string())
    }
}

impl From<serde_yaml::Error> for FddError {
    fn from(error: serde_yaml::Error) -> Self {
        FddError::parse_error(error.to_string())
    }
}

impl From<toml::de::Error> for FddError {
    fn from(error: toml::de::Error) -> Self {
        FddError::parse_error(error.to_string())
    }
}

impl From<toml::ser::Error> for FddError {
    fn from(error: toml::ser::Error) -> Self {
        FddError::parse_error(error.to_string())
    }
}

/// Result type alias using FddError
pub type FddResult<T> = Result<T, FddError>;

/// Contextual error mapping function
pub fn map_io_err<P: Into<PathBuf>>(path: P) -> impl FnOnce(std::io::Error) -> FddError {
    let path = path.into();
    move |err| FddError::io_error(err, Some(path))
}
