// Copyright (c) 2024 Botho Foundation

//! Log-space arithmetic helpers.

use statrs::function::erf::erfc;

use crate::RdpError;

/// `ln(e^a + e^b)` without overflow.
pub(crate) fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// `ln(e^a - e^b)` for `a >= b`.
pub(crate) fn log_sub(a: f64, b: f64) -> Result<f64, RdpError> {
    if b > a {
        return Err(RdpError::NegativeLogDifference);
    }
    if b == f64::NEG_INFINITY {
        return Ok(a);
    }
    if a == b {
        return Ok(f64::NEG_INFINITY);
    }
    Ok((a - b).exp_m1().ln() + b)
}

/// `ln(erfc(x))`, falling back to an asymptotic series once `erfc`
/// underflows to zero.
pub(crate) fn log_erfc(x: f64) -> f64 {
    let r = erfc(x);
    if r > 0.0 {
        return r.ln();
    }
    // erfc(x) ~ exp(-x^2) / (x sqrt(pi)) * (1 - 1/(2x^2) + 3/(4x^4) - ...)
    let x2 = x * x;
    -std::f64::consts::PI.ln() / 2.0 - x.ln() - x2 - 0.5 / x2 + 0.625 / x2.powi(2)
        - 37.0 / 24.0 / x2.powi(3)
        + 353.0 / 64.0 / x2.powi(4)
}
