use thiserror::Error;

/// Everything that can go wrong inside the invariant core.
///
/// Nothing here is fatal to the process: every failure is scoped to a single
/// computation or edit, and the history-boundary variants are soft.
#[derive(Debug, Error)]
pub enum InvariantError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Not enough data: needed {needed} points, found {found}")]
    InsufficientData { needed: usize, found: usize },

    #[error("Fit is degenerate: {0}")]
    FitDegenerate(String),

    #[error("Extrapolation failed: {0}")]
    ExtrapolationFailed(String),

    #[error("No curve is loaded")]
    NoCurveLoaded,

    #[error("Already at the first recorded state")]
    AtHistoryStart,

    #[error("Already at the last recorded state")]
    AtHistoryEnd,

    #[error("No bookmark with id {0}")]
    UnknownBookmark(u32),

    #[error("Session file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session document error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration file error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl InvariantError {
    /// History boundaries are reported but leave the session untouched.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::AtHistoryStart | Self::AtHistoryEnd)
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, InvariantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_errors() {
        assert!(InvariantError::AtHistoryStart.is_soft());
        assert!(InvariantError::AtHistoryEnd.is_soft());
        assert!(!InvariantError::NoCurveLoaded.is_soft());
        assert!(!InvariantError::UnknownBookmark(3).is_soft());
    }

    #[test]
    fn test_messages() {
        let err = InvariantError::InsufficientData {
            needed: 2,
            found: 1,
        };
        assert_eq!(err.to_string(), "Not enough data: needed 2 points, found 1");
        assert_eq!(
            InvariantError::invalid("scale must be positive").to_string(),
            "Invalid parameter: scale must be positive"
        );
    }
}
