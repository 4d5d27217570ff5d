//! Order statistics used by the imputation cascades.

/// Median of the finite values; the two middle values are averaged.
///
/// ```
/// use rental_common::median;
///
/// assert_eq!(median(&[80.0, 90.0]), Some(85.0));
/// assert_eq!(median(&[]), None);
/// ```
pub fn median(values: &[f64]) -> Option<f64> {
    let sorted = sorted_finite(values);
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

/// Quantile of values that are already sorted and finite, with linear
/// interpolation between closest ranks.
///
/// `q` is clamped to `[0, 1]`; the position of the result is `q * (n - 1)`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Most frequent value; ties resolve to the lexicographically smallest.
pub fn mode<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: std::collections::BTreeMap<&str, usize> = std::collections::BTreeMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}

pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn median_of_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
        assert_eq!(median(&[f64::NAN, 5.0]), Some(5.0));
    }

    #[test]
    fn quantile_interpolates() {
        let values = sorted_finite(&[1000.0, 10.0, f64::NAN, 10.0, 10.0, 10.0]);
        assert_eq!(quantile_sorted(&values, 0.0), Some(10.0));
        assert_eq!(quantile_sorted(&values, 0.6), Some(10.0));
        assert!((quantile_sorted(&values, 0.8).unwrap_or_default() - 208.0).abs() < 1e-9);
        assert_eq!(quantile_sorted(&values, 1.0), Some(1000.0));
        assert_eq!(quantile_sorted(&[], 0.5), None);
    }

    #[test]
    fn mode_breaks_ties_lexicographically() {
        assert_eq!(mode(["b", "a", "b", "a"]), Some("a".to_string()));
        assert_eq!(mode(["x", "y", "y"]), Some("y".to_string()));
        assert_eq!(mode(Vec::<&str>::new()), None);
    }

    proptest! {
        #[test]
        fn quantiles_stay_within_range(
            values in proptest::collection::vec(-1.0e6f64..1.0e6, 1..50),
            q in 0.0f64..=1.0,
        ) {
            let sorted = sorted_finite(&values);
            let value = quantile_sorted(&sorted, q).unwrap_or(f64::NAN);
            prop_assert!(value >= sorted[0] - 1e-6);
            prop_assert!(value <= sorted[sorted.len() - 1] + 1e-6);
        }
    }
}
