//! Kubernetes CPU quantity parsing.
//!
//! Quantities arrive as strings with an optional scale suffix:
//! `"250m"` (millicores), `"123456789n"` (nanocores, as reported by the
//! metrics API), `"5u"`, `"2"` or `"1.5"` (whole cores).

use crate::error::{ClusterError, ClusterResult};

/// Parse a CPU quantity into millicores.
pub fn parse_cpu_millicores(quantity: &str) -> ClusterResult<f64> {
    let q = quantity.trim();
    let invalid = || ClusterError::Quantity(quantity.to_string());

    let (number, scale) = match q.char_indices().last() {
        Some((idx, 'n')) => (&q[..idx], 1e-6),
        Some((idx, 'u')) => (&q[..idx], 1e-3),
        Some((idx, 'm')) => (&q[..idx], 1.0),
        Some(_) => (q, 1000.0),
        None => return Err(invalid()),
    };

    let value: f64 = number.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }

    Ok(value * scale)
}

/// Parse a CPU request into whole millicores, rounding to nearest.
pub fn parse_cpu_request_millicores(quantity: &str) -> ClusterResult<u64> {
    Ok(parse_cpu_millicores(quantity)?.round() as u64)
}
