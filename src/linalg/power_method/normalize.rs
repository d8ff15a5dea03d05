/// Rescale `x` in place so that its element of largest magnitude becomes `1.0`
///
/// The scale is the largest element, unless the magnitude of the smallest element exceeds it, in which case the smallest (negative) element is used.
/// The sign of the vector therefore settles such that the dominant entry is always positive.
///
/// Returns the scale that `x` was divided by. An empty vector is left untouched (returning `1.0`).
/// A zero scale produces `NaN`/`±Inf` entries; callers are expected to check the returned scale.
pub fn one_max(x: &mut [f64]) -> f64 {
    if x.is_empty() {
        return 1.0;
    }

    let (min, max) = x
        .iter()
        .fold((x[0], x[0]), |(min, max), &v| (min.min(v), max.max(v)));
    let scale = if min.abs() > max { min } else { max };

    x.iter_mut().for_each(|v| *v /= scale);
    scale
}

/// Set every element to zero
pub fn zeroize(x: &mut [f64]) {
    x.iter_mut().for_each(|v| *v = 0.0);
}

/// Set the elements at each (sorted, in-bounds) index to zero
pub fn zero_ignored(x: &mut [f64], ignore: &[usize]) {
    for &i in ignore {
        x[i] = 0.0;
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(a, b)| a * b).sum()
}

/// Taxicab norm of `a - b`
pub fn first_norm_delta(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(a, b)| (a - b).abs()).sum()
}
