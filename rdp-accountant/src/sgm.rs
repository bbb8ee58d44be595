// Copyright (c) 2024 Botho Foundation

//! RDP of the Sampled Gaussian Mechanism.
//!
//! For sampling ratio `q`, noise multiplier `σ` and order `α`, the RDP is
//! `ln(A_α) / (α - 1)` where `A_α` is the α-th moment of the privacy loss
//! of the subsampled mixture against the unsampled Gaussian. Integer orders
//! use the closed binomial expansion; fractional orders use a convergent
//! series involving `erfc`.

use statrs::function::factorial::ln_binomial;

use crate::{
    log_math::{log_add, log_erfc, log_sub},
    RdpError,
};

/// Series terms below `e^-30` no longer move the fractional-order sum.
const SERIES_CUTOFF: f64 = -30.0;

/// Upper bound on fractional series terms before giving up.
const MAX_SERIES_TERMS: usize = 100_000;

/// Compute RDP of `steps` compositions of the Sampled Gaussian Mechanism at
/// each of `orders`.
///
/// Returns one divergence per order, in the same order.
pub fn compute_rdp(
    q: f64,
    noise_multiplier: f64,
    steps: u64,
    orders: &[f64],
) -> Result<Vec<f64>, RdpError> {
    if !(0.0..=1.0).contains(&q) {
        return Err(RdpError::InvalidSamplingRatio(q));
    }
    if !noise_multiplier.is_finite() || noise_multiplier <= 0.0 {
        return Err(RdpError::InvalidNoiseMultiplier(noise_multiplier));
    }
    if steps == 0 {
        return Err(RdpError::ZeroSteps);
    }

    orders
        .iter()
        .map(|&alpha| rdp_single_order(q, noise_multiplier, alpha).map(|rdp| rdp * steps as f64))
        .collect()
}

/// RDP of a single step at a single order.
pub fn rdp_single_order(q: f64, sigma: f64, alpha: f64) -> Result<f64, RdpError> {
    if alpha.is_nan() || alpha <= 1.0 {
        return Err(RdpError::InvalidOrder(alpha));
    }
    if q == 0.0 {
        return Ok(0.0);
    }
    if q == 1.0 {
        return Ok(alpha / (2.0 * sigma * sigma));
    }
    if alpha.is_infinite() {
        return Ok(f64::INFINITY);
    }

    let log_a = if alpha.fract() == 0.0 {
        log_a_int(q, sigma, alpha as u64)
    } else {
        log_a_frac(q, sigma, alpha)?
    };
    Ok(log_a / (alpha - 1.0))
}

/// `ln(A_α)` for integer α.
fn log_a_int(q: f64, sigma: f64, alpha: u64) -> f64 {
    let log_q = q.ln();
    let log_1mq = (1.0 - q).ln();
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut log_a = f64::NEG_INFINITY;
    for i in 0..=alpha {
        let i_f = i as f64;
        let log_coef = ln_binomial(alpha, i) + i_f * log_q + (alpha - i) as f64 * log_1mq;
        let s = log_coef + (i_f * i_f - i_f) / two_sigma_sq;
        log_a = log_add(log_a, s);
    }
    log_a
}

/// `ln(A_α)` for fractional α.
///
/// Splits the integral at `z0` and sums two alternating binomial series,
/// each weighted by a Gaussian tail. Terms are added or subtracted by the
/// sign of the generalized binomial coefficient.
fn log_a_frac(q: f64, sigma: f64, alpha: f64) -> Result<f64, RdpError> {
    let log_q = q.ln();
    let log_1mq = (1.0 - q).ln();
    let sigma_sq = sigma * sigma;
    let z0 = sigma_sq * (1.0 / q - 1.0).ln() + 0.5;
    let scale = std::f64::consts::SQRT_2 * sigma;

    let mut log_a0 = f64::NEG_INFINITY;
    let mut log_a1 = f64::NEG_INFINITY;
    let mut coef = 1.0_f64;

    for i in 0..MAX_SERIES_TERMS {
        let i_f = i as f64;
        if i > 0 {
            coef *= (alpha - i_f + 1.0) / i_f;
        }
        let log_coef = coef.abs().ln();
        let j = alpha - i_f;

        let log_t0 = log_coef + i_f * log_q + j * log_1mq;
        let log_t1 = log_coef + j * log_q + i_f * log_1mq;

        let log_e0 = 0.5_f64.ln() + log_erfc((i_f - z0) / scale);
        let log_e1 = 0.5_f64.ln() + log_erfc((z0 - j) / scale);

        let log_s0 = log_t0 + (i_f * i_f - i_f) / (2.0 * sigma_sq) + log_e0;
        let log_s1 = log_t1 + (j * j - j) / (2.0 * sigma_sq) + log_e1;

        if coef > 0.0 {
            log_a0 = log_add(log_a0, log_s0);
            log_a1 = log_add(log_a1, log_s1);
        } else {
            log_a0 = log_sub(log_a0, log_s0)?;
            log_a1 = log_sub(log_a1, log_s1)?;
        }

        if log_s0.max(log_s1) < SERIES_CUTOFF {
            return Ok(log_add(log_a0, log_a1));
        }
    }

    Err(RdpError::SeriesDidNotConverge(alpha))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_sampling_is_free() {
        let rdp = compute_rdp(0.0, 1.0, 10, &[2.0, 4.5, 32.0]).unwrap();
        assert_eq!(rdp, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_full_batch_is_plain_gaussian() {
        let rdp = compute_rdp(1.0, 2.0, 3, &[2.0, 8.0]).unwrap();
        assert!((rdp[0] - 3.0 * 2.0 / 8.0).abs() < 1e-12);
        assert!((rdp[1] - 3.0 * 8.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_known_single_step_values() {
        // q = 0.01, sigma = 1.0
        let cases = [
            (1.5, 0.000_127_253_743_511_541_45),
            (2.0, 0.000_171_813_422_074_534_28),
            (5.0, 0.000_468_667_242_169_153),
        ];
        for (alpha, expected) in cases {
            let rdp = rdp_single_order(0.01, 1.0, alpha).unwrap();
            assert!(
                (rdp - expected).abs() < 1e-9,
                "order {alpha}: expected {expected}, got {rdp}"
            );
        }
    }

    #[test]
    fn test_steps_scale_linearly() {
        let orders = [1.75, 3.0, 20.0];
        let one = compute_rdp(0.02, 1.3, 1, &orders).unwrap();
        let many = compute_rdp(0.02, 1.3, 40, &orders).unwrap();
        for (a, b) in one.iter().zip(&many) {
            assert!((a * 40.0 - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        assert_eq!(
            compute_rdp(1.5, 1.0, 1, &[2.0]),
            Err(RdpError::InvalidSamplingRatio(1.5))
        );
        assert_eq!(
            compute_rdp(0.1, 0.0, 1, &[2.0]),
            Err(RdpError::InvalidNoiseMultiplier(0.0))
        );
        assert_eq!(compute_rdp(0.1, 1.0, 0, &[2.0]), Err(RdpError::ZeroSteps));
        assert_eq!(
            compute_rdp(0.1, 1.0, 1, &[1.0]),
            Err(RdpError::InvalidOrder(1.0))
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn more_noise_never_costs_more(
            q in 0.001f64..0.2,
            sigma in 0.8f64..4.0,
            alpha in prop::sample::select(vec![1.5, 2.0, 3.5, 8.0, 32.0]),
        ) {
            let weak = rdp_single_order(q, sigma, alpha).unwrap();
            let strong = rdp_single_order(q, sigma * 1.5, alpha).unwrap();
            prop_assert!(weak >= 0.0);
            prop_assert!(strong <= weak + 1e-12);
        }
    }
}
