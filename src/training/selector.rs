//! Choosing a point on the regularization path.
//!
//! Two policies:
//! - [`SelectionPolicy::MaxRules`]: the densest converged point with at most
//!   `k` nonzero columns.
//! - [`SelectionPolicy::Knee`]: the point after which adding columns stops
//!   paying off. For each distinct nonzero count the best deviance is kept;
//!   the marginal gain between consecutive counts is
//!   `(dev[i-1] - dev[i]) / (count[i] - count[i-1])`. Starting at the point
//!   reached by the largest gain `m*`, the first point whose next gain falls
//!   below `fraction × m*` is chosen, or the last point if none does.
//!
//! Only converged points are eligible. Nonzero counts cover rule and linear
//! columns, never intercepts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::linear::RegularizationPath;

/// How many columns to keep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SelectionPolicy {
    MaxRules(usize),
    Knee { fraction: f64 },
}

/// Outcome of [`select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Index into `path.points`.
    Point(usize),
    /// No eligible point has any nonzero column; use the null model.
    InterceptOnly,
    /// No point on the path converged.
    NotConverged,
}

/// Select a path point according to `policy`.
pub fn select(path: &RegularizationPath, policy: SelectionPolicy) -> Selection {
    let converged: Vec<(usize, usize, f64)> = path
        .points
        .iter()
        .enumerate()
        .filter(|(_, p)| p.converged)
        .map(|(i, p)| (i, p.n_nonzero(), p.deviance))
        .collect();
    if converged.is_empty() {
        return Selection::NotConverged;
    }

    match policy {
        SelectionPolicy::MaxRules(k) => select_max_rules(&converged, k),
        SelectionPolicy::Knee { fraction } => select_knee(&converged, path.null_deviance, fraction),
    }
}

fn select_max_rules(converged: &[(usize, usize, f64)], k: usize) -> Selection {
    let mut best: Option<(usize, usize)> = None;
    for &(idx, nnz, _) in converged {
        if nnz <= k && best.is_none_or(|(_, best_nnz)| nnz > best_nnz) {
            best = Some((idx, nnz));
        }
    }
    best.map_or(Selection::InterceptOnly, |(idx, _)| Selection::Point(idx))
}

fn select_knee(converged: &[(usize, usize, f64)], null_deviance: f64, fraction: f64) -> Selection {
    // count -> (point, deviance); first point wins ties
    let mut by_count: BTreeMap<usize, (Option<usize>, f64)> = BTreeMap::new();
    for &(idx, nnz, dev) in converged {
        let entry = by_count.entry(nnz).or_insert((Some(idx), dev));
        if dev < entry.1 {
            *entry = (Some(idx), dev);
        }
    }
    by_count.entry(0).or_insert((None, null_deviance));

    let curve: Vec<(usize, Option<usize>, f64)> =
        by_count.into_iter().map(|(count, (idx, dev))| (count, idx, dev)).collect();
    let as_selection = |i: usize| curve[i].1.map_or(Selection::InterceptOnly, Selection::Point);

    // gains[i] is the gain of moving from curve[i - 1] to curve[i]
    let gains: Vec<f64> = (0..curve.len())
        .map(|i| {
            if i == 0 {
                f64::NEG_INFINITY
            } else {
                (curve[i - 1].2 - curve[i].2) / (curve[i].0 - curve[i - 1].0) as f64
            }
        })
        .collect();

    let mut best: Option<(usize, f64)> = None;
    for (i, &gain) in gains.iter().enumerate().skip(1) {
        if best.is_none_or(|(_, best_gain)| gain > best_gain) {
            best = Some((i, gain));
        }
    }
    let Some((best_at, best_gain)) = best else {
        return as_selection(0);
    };
    if best_gain <= 0.0 {
        return as_selection(0);
    }

    let threshold = fraction * best_gain;
    let knee = (best_at..curve.len())
        .find(|&j| gains.get(j + 1).is_none_or(|&next| next < threshold))
        .unwrap_or(curve.len() - 1);
    log::debug!(
        "knee at {} nonzero columns (best marginal gain {:.6} at {})",
        curve[knee].0,
        best_gain,
        curve[best_at].0
    );
    as_selection(knee)
}
