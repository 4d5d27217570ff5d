//! Price bucketing.
//!
//! Quantile mode places edges at the run-local quantiles `0, 1/n, .., 1` for
//! `n` labels. Equal edges are collapsed and the first `k` labels are used for
//! the `k` remaining intervals; fewer than two intervals yields the fallback
//! label for every observed value. Intervals are right-closed and the lowest
//! edge is inclusive.

use rental_common::stats::{quantile_sorted, sorted_finite};
use rental_model::BucketingMode;

#[derive(Debug, Clone, PartialEq)]
pub struct Buckets {
    pub labels: Vec<Option<String>>,
    /// Number of intervals actually used.
    pub intervals: usize,
    /// True when the requested interval count could not be honored.
    pub reduced: bool,
}

pub fn bucketize(
    values: &[Option<f64>],
    mode: &BucketingMode,
    quantile_labels: &[String],
    fallback: &str,
) -> Buckets {
    match mode {
        BucketingMode::Quantile => quantile_buckets(values, quantile_labels, fallback),
        BucketingMode::Fixed { bins, labels } => fixed_buckets(values, bins, labels),
    }
}

fn quantile_buckets(values: &[Option<f64>], labels: &[String], fallback: &str) -> Buckets {
    let observed: Vec<f64> = values.iter().flatten().copied().collect();
    let sorted = sorted_finite(&observed);
    let requested = labels.len();
    if sorted.is_empty() || requested == 0 {
        return Buckets {
            labels: vec![None; values.len()],
            intervals: 0,
            reduced: requested > 0,
        };
    }

    let mut edges: Vec<f64> = (0..=requested)
        .filter_map(|i| quantile_sorted(&sorted, i as f64 / requested as f64))
        .collect();
    edges.dedup();
    let intervals = edges.len().saturating_sub(1);

    if intervals < 2 {
        let labels = values
            .iter()
            .map(|value| value.filter(|v| v.is_finite()).map(|_| fallback.to_string()))
            .collect();
        return Buckets {
            labels,
            intervals: 1,
            reduced: true,
        };
    }

    Buckets {
        labels: assign(values, &edges, &labels[..intervals]),
        intervals,
        reduced: intervals < requested,
    }
}

fn fixed_buckets(values: &[Option<f64>], bins: &[f64], labels: &[String]) -> Buckets {
    let intervals = bins.len().saturating_sub(1);
    let ascending = bins.windows(2).all(|pair| pair[0] < pair[1]);
    if intervals == 0 || labels.len() != intervals || !ascending {
        return Buckets {
            labels: vec![None; values.len()],
            intervals: 0,
            reduced: true,
        };
    }
    Buckets {
        labels: assign(values, bins, labels),
        intervals,
        reduced: false,
    }
}

fn assign(values: &[Option<f64>], edges: &[f64], labels: &[String]) -> Vec<Option<String>> {
    values
        .iter()
        .map(|value| {
            let v = value.filter(|v| v.is_finite())?;
            interval_of(v, edges).map(|idx| labels[idx].clone())
        })
        .collect()
}

/// Index of the right-closed interval holding `v`; the first interval also
/// holds its lower edge.
fn interval_of(v: f64, edges: &[f64]) -> Option<usize> {
    let first = *edges.first()?;
    let last = *edges.last()?;
    if v < first || v > last {
        return None;
    }
    if v == first {
        return Some(0);
    }
    edges.iter().skip(1).position(|edge| v <= *edge)
}
