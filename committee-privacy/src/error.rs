// Copyright (c) 2024 Botho Foundation

use bth_rdp_accountant::RdpError;
use thiserror::Error;

/// Errors raised by committee privacy analysis.
///
/// Invalid inputs are rejected as soon as they are seen; nothing is clamped
/// into range on the caller's behalf.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrivacyError {
    /// A parameter is outside its valid domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Observation schedule inputs are invalid.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// More observed rounds were requested than there are rounds.
    #[error("requested {observed} observed rounds but only {total} rounds exist")]
    ScheduleCount { observed: u64, total: u64 },

    /// The Renyi accountant rejected its inputs.
    #[error("accountant error: {0}")]
    Accountant(#[from] RdpError),
}

/// Shorthand for results in this crate.
pub type Result<T> = std::result::Result<T, PrivacyError>;

/// Reject probabilities that are NaN or outside `[0, 1]`.
pub(crate) fn check_probability(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PrivacyError::InvalidParameter(format!(
            "{name} must be in [0, 1], got {value}"
        )))
    }
}
