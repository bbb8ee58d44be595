// Copyright (c) 2024 Botho Foundation

//! Conversion from RDP to (ε, δ)-DP.

use crate::RdpError;

/// Privacy spent at a target δ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrivacySpent {
    /// Smallest ε over all candidate orders.
    pub epsilon: f64,
    /// The δ the conversion was made at.
    pub delta: f64,
    /// Order at which ε was attained.
    pub optimal_order: f64,
}

/// Convert accumulated RDP into an (ε, δ) guarantee.
///
/// Uses `ε_α = rdp_α + ln(1/δ) / (α - 1)` and takes the minimum over orders.
/// Orders whose ε is NaN are skipped.
pub fn privacy_spent(
    orders: &[f64],
    rdp: &[f64],
    target_delta: f64,
) -> Result<PrivacySpent, RdpError> {
    if orders.len() != rdp.len() {
        return Err(RdpError::LengthMismatch {
            orders: orders.len(),
            rdp: rdp.len(),
        });
    }
    if !(target_delta > 0.0 && target_delta < 1.0) {
        return Err(RdpError::InvalidDelta(target_delta));
    }

    let log_delta = target_delta.ln();
    let mut best: Option<(f64, f64)> = None;

    for (&alpha, &divergence) in orders.iter().zip(rdp) {
        if alpha.is_nan() || alpha <= 1.0 {
            return Err(RdpError::InvalidOrder(alpha));
        }
        let eps = divergence - log_delta / (alpha - 1.0);
        if eps.is_nan() {
            continue;
        }
        match best {
            Some((best_eps, _)) if best_eps <= eps => {}
            _ => best = Some((eps, alpha)),
        }
    }

    match best {
        Some((epsilon, optimal_order)) if epsilon.is_finite() => Ok(PrivacySpent {
            epsilon,
            delta: target_delta,
            optimal_order,
        }),
        _ => Err(RdpError::NoFiniteEpsilon),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picks_minimizing_order() {
        let orders = [2.0, 10.0, 100.0];
        let rdp = [0.01, 0.5, 10.0];
        let spent = privacy_spent(&orders, &rdp, 1e-5).unwrap();

        let expected = 0.5 + (1e5_f64).ln() / 9.0;
        assert_eq!(spent.optimal_order, 10.0);
        assert!((spent.epsilon - expected).abs() < 1e-12);
        assert_eq!(spent.delta, 1e-5);
    }

    #[test]
    fn test_skips_nan_orders() {
        let spent = privacy_spent(&[2.0, 4.0], &[f64::NAN, 0.1], 1e-3).unwrap();
        assert_eq!(spent.optimal_order, 4.0);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert_eq!(
            privacy_spent(&[2.0], &[0.1, 0.2], 1e-5),
            Err(RdpError::LengthMismatch { orders: 1, rdp: 2 })
        );
        assert_eq!(
            privacy_spent(&[2.0], &[0.1], 0.0),
            Err(RdpError::InvalidDelta(0.0))
        );
        assert_eq!(
            privacy_spent(&[2.0], &[f64::INFINITY], 1e-5),
            Err(RdpError::NoFiniteEpsilon)
        );
    }
}
