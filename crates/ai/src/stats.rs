//! Small deterministic statistics shared by the models.

/// Arithmetic mean. NaN for an empty slice, so degenerate input stays visible.
pub fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / (xs.len() as f64)
}

/// Population standard deviation (n), deterministic.
pub fn std_dev_population(xs: &[f64], mean: f64) -> f64 {
    let var = xs
        .iter()
        .map(|x| {
            let d = x - mean;
            d * d
        })
        .sum::<f64>()
        / (xs.len() as f64);
    var.sqrt()
}

/// Least-squares slope of `values` against their index (0, 1, 2, ...).
///
/// Returns 0 for fewer than two points.
pub fn least_squares_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let n = values.len() as f64;
    let sum_x = n * (n - 1.0) / 2.0;
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, v)| i as f64 * v).sum();
    let sum_x2 = n * (n - 1.0) * (2.0 * n - 1.0) / 6.0;

    (n * sum_xy - sum_x * sum_y) / (n * sum_x2 - sum_x * sum_x)
}
