//! Order statistics shared by training and analytics. Means and spreads come
//! straight from ndarray.

/// Linearly interpolated quantile, `q` in [0, 1]. Sorts `x` in place.
/// Inspired by numpy.quantile with the default "linear" method.
pub fn quantile(x: &mut [f64], q: f64) -> Option<f64> {
    if x.is_empty() {
        return None;
    }
    x.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (x.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(x[lo] + (x[hi] - x[lo]) * (pos - lo as f64))
}

pub fn median(x: &mut [f64]) -> Option<f64> {
    quantile(x, 0.5)
}
