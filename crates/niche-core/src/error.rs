use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes of the niche pipeline.
///
/// `MissingInput` and `AllDataMissing` are data-availability conditions that
/// stages recover from locally; everything else aborts the run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("input file not found: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("every observation of species {species} is missing")]
    AllDataMissing { species: String },

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("degenerate numeric input: {0}")]
    NumericDegenerate(String),

    #[error("matrix shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("run interrupted")]
    Interrupted,

    #[error("malformed {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn degenerate(msg: impl Into<String>) -> Self {
        Error::NumericDegenerate(msg.into())
    }

    /// True for conditions a stage should log and treat as missing data.
    pub fn is_data_absence(&self) -> bool {
        matches!(self, Error::MissingInput { .. } | Error::AllDataMissing { .. })
    }
}

/// Outcome of loading a single PNO profile file.
///
/// Kept separate from [`Error`] so callers can tell "absent" apart from
/// "present but unreadable" without matching on every pipeline variant.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("PNO file not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("malformed PNO file {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
}

impl From<ProfileError> for Error {
    fn from(e: ProfileError) -> Self {
        match e {
            ProfileError::Missing { path } => Error::MissingInput { path },
            ProfileError::Malformed { path, reason } => Error::Malformed { path, reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_profile_maps_to_data_absence() {
        let e: Error = ProfileError::Missing { path: "pno1_a.csv".into() }.into();
        assert!(e.is_data_absence());
        let e: Error = ProfileError::Malformed { path: "pno1_a.csv".into(), reason: "x".into() }.into();
        assert!(!e.is_data_absence());
    }
}
