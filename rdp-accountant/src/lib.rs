// Copyright (c) 2024 Botho Foundation

//! Renyi differential privacy accounting for the Sampled Gaussian Mechanism.
//!
//! The Sampled Gaussian Mechanism (SGM) draws a Poisson subsample of the data
//! with probability `q`, sums the clipped contributions, and adds Gaussian
//! noise with standard deviation `noise_multiplier × clip_norm`. Its privacy
//! loss is tracked as a vector of Renyi divergences, one per candidate order
//! α, which compose additively across steps.
//!
//! ## Usage
//!
//! ```
//! use bth_rdp_accountant::{compute_rdp, default_orders, privacy_spent};
//!
//! let orders = default_orders();
//! let rdp = compute_rdp(0.01, 1.1, 1000, &orders).unwrap();
//! let spent = privacy_spent(&orders, &rdp, 1e-5).unwrap();
//! assert!(spent.epsilon > 0.0);
//! ```
//!
//! ## References
//!
//! - Mironov, "Rényi Differential Privacy" (2017)
//! - Mironov, Talwar, Zhang, "Rényi Differential Privacy of the Sampled
//!   Gaussian Mechanism" (2019)

mod conversion;
mod error;
mod log_math;
mod sgm;

pub use conversion::{privacy_spent, PrivacySpent};
pub use error::RdpError;
pub use sgm::{compute_rdp, rdp_single_order};

/// Candidate orders used when the caller does not supply their own.
///
/// Dense at small fractional orders (where weak mechanisms peak), every
/// integer up to 63, and a few large orders for strongly noised mechanisms.
pub fn default_orders() -> Vec<f64> {
    let mut orders = vec![1.25, 1.5, 1.75, 2.0, 2.25, 2.5, 3.0, 3.5, 4.0, 4.5];
    orders.extend((5..64).map(|a| a as f64));
    orders.extend([128.0, 256.0, 512.0]);
    orders
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_orders_ascending() {
        let orders = default_orders();
        assert_eq!(orders.len(), 72);
        assert!(orders.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(orders[0], 1.25);
        assert_eq!(*orders.last().unwrap(), 512.0);
    }

    #[test]
    fn test_dp_sgd_reference_scenario() {
        // 60k examples, batch 256, noise 1.12, 60 epochs: the well known
        // (2.92, 1e-5) DP-SGD operating point.
        let q = 256.0 / 60_000.0;
        let steps = (60.0_f64 * 60_000.0 / 256.0).ceil() as u64;
        let orders = default_orders();

        let rdp = compute_rdp(q, 1.12, steps, &orders).unwrap();
        let spent = privacy_spent(&orders, &rdp, 1e-5).unwrap();

        assert!(
            (spent.epsilon - 2.92).abs() < 0.01,
            "expected eps ~2.92, got {}",
            spent.epsilon
        );
        assert_eq!(spent.optimal_order, 9.0);
    }
}
