// Copyright (c) 2024 Botho Foundation

use thiserror::Error;

/// Errors produced by the RDP accountant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RdpError {
    /// Sampling ratio outside `[0, 1]`.
    #[error("sampling ratio must be in [0, 1], got {0}")]
    InvalidSamplingRatio(f64),

    /// Noise multiplier is not a positive finite number.
    #[error("noise multiplier must be positive and finite, got {0}")]
    InvalidNoiseMultiplier(f64),

    /// Renyi order must be strictly greater than one.
    #[error("renyi order must be > 1, got {0}")]
    InvalidOrder(f64),

    /// Target delta outside the open interval `(0, 1)`.
    #[error("target delta must be in (0, 1), got {0}")]
    InvalidDelta(f64),

    /// A composition of zero steps was requested.
    #[error("steps must be at least 1")]
    ZeroSteps,

    /// Order and divergence vectors differ in length.
    #[error("got {orders} orders but {rdp} divergence values")]
    LengthMismatch { orders: usize, rdp: usize },

    /// No candidate order produced a usable epsilon.
    #[error("no candidate order yields a finite epsilon")]
    NoFiniteEpsilon,

    /// Log-space subtraction would produce a negative quantity.
    #[error("log-space subtraction would be negative")]
    NegativeLogDifference,

    /// The fractional-order series failed to converge.
    #[error("series for order {0} did not converge")]
    SeriesDidNotConverge(f64),
}
