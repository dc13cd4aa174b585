//! Training-set subsampling before fit.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::dataset::{Labels, class_index};
use crate::error::{EvalError, Result};
use crate::task::TaskType;

/// How rows are picked when a subsample size is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsamplePolicy {
    /// First `n` rows.
    Head,
    /// Uniform sample without replacement, seeded.
    #[default]
    Random,
    /// Keep class proportions (single-label classification only; other
    /// tasks fall back to `Random`).
    Stratified,
}

/// Sorted row indices to fit on.
///
/// Returns every row when `size` is at least the number of rows.
pub fn subsample_indices(
    policy: SubsamplePolicy,
    task: TaskType,
    y: &Labels,
    size: usize,
    seed: u64,
) -> Result<Vec<usize>> {
    let n = y.len();
    if size == 0 {
        return Err(EvalError::Dataset("subsample size must be positive".to_string()));
    }
    if size >= n {
        return Ok((0..n).collect());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = match (policy, y) {
        (SubsamplePolicy::Head, _) => (0..size).collect(),
        (SubsamplePolicy::Stratified, Labels::Vector(v))
            if task.is_classification() && !task.is_multilabel() =>
        {
            let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
            for (row, &value) in v.iter().enumerate() {
                by_class.entry(class_index(value)?).or_default().push(row);
            }
            let quotas = stratified_quotas(&by_class, n, size);
            let mut rows = Vec::with_capacity(size);
            for ((_, members), quota) in by_class.iter().zip(quotas) {
                rows.extend(
                    index::sample(&mut rng, members.len(), quota)
                        .into_iter()
                        .map(|i| members[i]),
                );
            }
            rows
        }
        _ => index::sample(&mut rng, n, size).into_vec(),
    };
    rows.sort_unstable();
    Ok(rows)
}

/// Per-class sample counts summing to `size`, largest remainders first.
fn stratified_quotas(by_class: &BTreeMap<usize, Vec<usize>>, n: usize, size: usize) -> Vec<usize> {
    let exact: Vec<f64> = by_class
        .values()
        .map(|members| size as f64 * members.len() as f64 / n as f64)
        .collect();
    let mut quotas: Vec<usize> = exact.iter().map(|q| q.floor() as usize).collect();

    let mut order: Vec<usize> = (0..quotas.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });

    let capacity: Vec<usize> = by_class.values().map(Vec::len).collect();
    let mut missing = size - quotas.iter().sum::<usize>();
    while missing > 0 {
        let before = missing;
        for &i in &order {
            if missing == 0 {
                break;
            }
            if quotas[i] < capacity[i] {
                quotas[i] += 1;
                missing -= 1;
            }
        }
        if before == missing {
            break;
        }
    }
    quotas
}
