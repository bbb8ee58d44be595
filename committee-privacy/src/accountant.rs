// Copyright (c) 2024 Botho Foundation

//! The Renyi accountant seam.
//!
//! Composition only needs two capabilities from an accountant: the per-order
//! divergence of a number of Sampled Gaussian Mechanism steps, and the
//! conversion of accumulated divergence to an (ε, δ) guarantee. Production
//! code uses [`SampledGaussianAccountant`]; tests can substitute
//! [`FixedDivergenceAccountant`] to get exact, hand-checkable numbers.

use bth_rdp_accountant::{compute_rdp, privacy_spent, PrivacySpent, RdpError};

/// Renyi differential privacy accountant for the Sampled Gaussian Mechanism.
pub trait RenyiAccountant {
    /// Per-order divergence of `steps` compositions at the given sampling
    /// ratio and noise multiplier.
    fn compute_rdp(
        &self,
        sampling_ratio: f64,
        noise_multiplier: f64,
        steps: u64,
        orders: &[f64],
    ) -> Result<Vec<f64>, RdpError>;

    /// Best (ε, order) for accumulated divergence `rdp` at `target_delta`.
    fn privacy_spent(
        &self,
        orders: &[f64],
        rdp: &[f64],
        target_delta: f64,
    ) -> Result<PrivacySpent, RdpError>;
}

impl<A: RenyiAccountant + ?Sized> RenyiAccountant for &A {
    fn compute_rdp(
        &self,
        sampling_ratio: f64,
        noise_multiplier: f64,
        steps: u64,
        orders: &[f64],
    ) -> Result<Vec<f64>, RdpError> {
        (**self).compute_rdp(sampling_ratio, noise_multiplier, steps, orders)
    }

    fn privacy_spent(
        &self,
        orders: &[f64],
        rdp: &[f64],
        target_delta: f64,
    ) -> Result<PrivacySpent, RdpError> {
        (**self).privacy_spent(orders, rdp, target_delta)
    }
}

/// Moments accountant backed by `bth-rdp-accountant`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SampledGaussianAccountant;

impl RenyiAccountant for SampledGaussianAccountant {
    fn compute_rdp(
        &self,
        sampling_ratio: f64,
        noise_multiplier: f64,
        steps: u64,
        orders: &[f64],
    ) -> Result<Vec<f64>, RdpError> {
        compute_rdp(sampling_ratio, noise_multiplier, steps, orders)
    }

    fn privacy_spent(
        &self,
        orders: &[f64],
        rdp: &[f64],
        target_delta: f64,
    ) -> Result<PrivacySpent, RdpError> {
        privacy_spent(orders, rdp, target_delta)
    }
}

/// Deterministic accountant producing synthetic divergences.
///
/// Each step contributes `scale × α / σ²` at order α, independent of the
/// sampling ratio. Conversion uses the same `rdp + ln(1/δ)/(α − 1)` rule as
/// the production converter, so only the divergence model is synthetic.
#[derive(Clone, Copy, Debug)]
pub struct FixedDivergenceAccountant {
    scale: f64,
}

impl FixedDivergenceAccountant {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    /// Divergence of a single step at order `alpha`.
    pub fn step_divergence(&self, noise_multiplier: f64, alpha: f64) -> f64 {
        self.scale * alpha / (noise_multiplier * noise_multiplier)
    }
}

impl Default for FixedDivergenceAccountant {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl RenyiAccountant for FixedDivergenceAccountant {
    fn compute_rdp(
        &self,
        _sampling_ratio: f64,
        noise_multiplier: f64,
        steps: u64,
        orders: &[f64],
    ) -> Result<Vec<f64>, RdpError> {
        if !noise_multiplier.is_finite() || noise_multiplier <= 0.0 {
            return Err(RdpError::InvalidNoiseMultiplier(noise_multiplier));
        }
        if steps == 0 {
            return Err(RdpError::ZeroSteps);
        }
        Ok(orders
            .iter()
            .map(|&alpha| steps as f64 * self.step_divergence(noise_multiplier, alpha))
            .collect())
    }

    fn privacy_spent(
        &self,
        orders: &[f64],
        rdp: &[f64],
        target_delta: f64,
    ) -> Result<PrivacySpent, RdpError> {
        privacy_spent(orders, rdp, target_delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_divergence_values() {
        let accountant = FixedDivergenceAccountant::new(0.5);
        let rdp = accountant.compute_rdp(0.3, 2.0, 3, &[2.0, 8.0]).unwrap();
        assert_eq!(rdp, vec![0.75, 3.0]);
        assert_eq!(
            accountant.compute_rdp(0.3, 2.0, 0, &[2.0]),
            Err(RdpError::ZeroSteps)
        );
    }

    #[test]
    fn test_production_accountant_delegates() {
        let orders = [2.0, 16.0];
        let direct = compute_rdp(0.01, 1.0, 5, &orders).unwrap();
        let via_trait = SampledGaussianAccountant
            .compute_rdp(0.01, 1.0, 5, &orders)
            .unwrap();
        assert_eq!(direct, via_trait);
    }

    #[test]
    fn test_reference_forwarding() {
        fn single_step<A: RenyiAccountant>(accountant: A) -> Vec<f64> {
            accountant.compute_rdp(0.1, 1.0, 1, &[4.0]).unwrap()
        }

        let accountant = FixedDivergenceAccountant::default();
        assert_eq!(single_step(&accountant), vec![2.0]);
    }
}
