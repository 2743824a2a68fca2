use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriftError {
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Unknown reference strategy: {0}")]
    UnknownStrategy(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid window duration: {0}")]
    InvalidWindow(String),

    #[error("Invalid series: {0}")]
    InvalidSeries(String),
}

impl DriftError {
    /// Unknown tags or out-of-range settings in the configuration record.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DriftError::UnknownMetric(_) | DriftError::UnknownStrategy(_) | DriftError::InvalidConfig(_)
        )
    }

    /// Malformed input: unordered series or an unusable window span.
    pub fn is_input_shape(&self) -> bool {
        matches!(self, DriftError::InvalidWindow(_) | DriftError::InvalidSeries(_))
    }
}
