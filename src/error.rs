use thiserror::Error;

pub type Result<T> = std::result::Result<T, SurvivalError>;

/// errors raised while predicting - same taxonomy as everything else
pub type PredictionError = SurvivalError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurvivalError {
    #[error("data unavailable: {message}")]
    DataUnavailable { message: String },

    #[error("cox fit did not converge: {message}")]
    ConvergenceError { message: String },

    #[error("covariates don't match the fitted schema: {message}")]
    SchemaMismatch { message: String },

    #[error("not enough data: {message}")]
    InsufficientData { message: String },

    #[error("numeric overflow: {message}")]
    NumericOverflow { message: String },

    #[error("dimensions don't match: {message}")]
    InvalidDimensions { message: String },

    #[error("survival data is broken: {message}")]
    InvalidData { message: String },

    #[error("bad config: {message}")]
    Config { message: String },
}

impl SurvivalError {
    pub fn data_unavailable(message: impl Into<String>) -> Self {
        Self::DataUnavailable { message: message.into() }
    }

    pub fn convergence(message: impl Into<String>) -> Self {
        Self::ConvergenceError { message: message.into() }
    }

    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch { message: message.into() }
    }

    pub fn insufficient_data(message: impl Into<String>) -> Self {
        Self::InsufficientData { message: message.into() }
    }

    pub fn numeric_overflow(message: impl Into<String>) -> Self {
        Self::NumericOverflow { message: message.into() }
    }

    pub fn invalid_dimensions(message: impl Into<String>) -> Self {
        Self::InvalidDimensions { message: message.into() }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// short label for log fields / user warnings
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUnavailable { .. } => "DataUnavailable",
            Self::ConvergenceError { .. } => "ConvergenceError",
            Self::SchemaMismatch { .. } => "SchemaMismatch",
            Self::InsufficientData { .. } => "InsufficientData",
            Self::NumericOverflow { .. } => "NumericOverflow",
            Self::InvalidDimensions { .. } => "InvalidDimensions",
            Self::InvalidData { .. } => "InvalidData",
            Self::Config { .. } => "Config",
        }
    }
}
