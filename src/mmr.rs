//! Maximal Marginal Relevance selection over a candidate pool.
//!
//! Greedy re-ranking: pick the single most query-relevant candidate first,
//! then repeatedly pick the candidate maximizing
//!
//! ```text
//! score(i) = lambda_mult * relevance(i)
//!          - (1 - lambda_mult) * max_sim_to_selected(i)
//! ```
//!
//! until `min(k, m)` candidates are selected. `lambda_mult = 1` degenerates
//! to plain top-k by relevance; `lambda_mult = 0` maximizes diversity and
//! ignores relevance after the first pick.
//!
//! Two contract points worth calling out:
//!
//! - The first pick is an explicit argmax over query relevance. Upstream
//!   nearest-neighbor backends usually return hits sorted by similarity,
//!   but not all do, and some report distances rather than similarities.
//!   Recomputing keeps the selection backend-independent.
//! - Every tie breaks toward the lowest candidate index, so identical
//!   inputs always produce identical output ordering.
//!
//! Reference: Carbonell & Goldstein, 1998.

use crate::error::{MnemoError, Result};
use crate::similarity::cosine;
use crate::types::{Candidate, Retrieved};

// ── Parameters ───────────────────────────────────────────────────────────

/// Selection parameters for [`select_indices`] / [`select_diverse`].
#[derive(Debug, Clone, Copy)]
pub struct MmrParams {
    /// Number of results to select. Must be at least 1.
    pub k: usize,
    /// Relevance/diversity trade-off in `[0, 1]`. Higher favors relevance.
    pub lambda_mult: f32,
}

impl Default for MmrParams {
    fn default() -> Self {
        Self {
            k: 5,
            lambda_mult: 0.5,
        }
    }
}

impl MmrParams {
    #[must_use]
    pub fn new(k: usize, lambda_mult: f32) -> Self {
        Self { k, lambda_mult }
    }

    /// Reject out-of-contract parameters instead of clamping them;
    /// silent clamping hides caller bugs.
    pub fn validate(&self) -> Result<()> {
        if self.k < 1 {
            return Err(MnemoError::invalid("k must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.lambda_mult) || self.lambda_mult.is_nan() {
            return Err(MnemoError::invalid(format!(
                "lambda_mult must be within [0, 1], got {}",
                self.lambda_mult
            )));
        }
        Ok(())
    }
}

// ── Selection ────────────────────────────────────────────────────────────

/// Select up to `min(k, m)` embedding indices, in selection order.
///
/// The input pool is never mutated and may arrive in any order. Costs one
/// relevance pass over the pool plus `O(k * m)` pairwise dot products; the
/// running maximum similarity to the selected set is maintained
/// incrementally rather than recomputed per round.
///
/// Errors with `InvalidParameter` for out-of-range parameters and
/// `DimensionMismatch` when any embedding disagrees with the query vector
/// dimensionality. An empty pool is not an error: the result is empty.
pub fn select_indices<V: AsRef<[f32]>>(
    query_vector: &[f32],
    embeddings: &[V],
    params: MmrParams,
) -> Result<Vec<usize>> {
    params.validate()?;

    let m = embeddings.len();
    if m == 0 {
        return Ok(Vec::new());
    }

    for embedding in embeddings {
        let len = embedding.as_ref().len();
        if len != query_vector.len() {
            return Err(MnemoError::DimensionMismatch {
                expected: query_vector.len(),
                actual: len,
            });
        }
    }

    let relevance: Vec<f32> = embeddings
        .iter()
        .map(|e| cosine(query_vector, e.as_ref()))
        .collect();

    // First pick: argmax relevance, lowest index on ties.
    let mut first = 0usize;
    for (i, rel) in relevance.iter().enumerate().skip(1) {
        if *rel > relevance[first] {
            first = i;
        }
    }

    let take = params.k.min(m);
    let mut selected = Vec::with_capacity(take);
    let mut picked = vec![false; m];
    selected.push(first);
    picked[first] = true;

    // max_sim[i] = max similarity between candidate i and the selected set.
    // Folded forward one selection at a time; every unpicked slot is
    // refreshed against the newest selection before the next scoring pass.
    let mut max_sim = vec![f32::NEG_INFINITY; m];
    let mut newest = first;

    while selected.len() < take {
        for i in 0..m {
            if picked[i] {
                continue;
            }
            let sim = cosine(embeddings[i].as_ref(), embeddings[newest].as_ref());
            if sim > max_sim[i] {
                max_sim[i] = sim;
            }
        }

        let mut best: Option<usize> = None;
        let mut best_score = f32::NEG_INFINITY;
        for i in 0..m {
            if picked[i] {
                continue;
            }
            let score =
                params.lambda_mult * relevance[i] - (1.0 - params.lambda_mult) * max_sim[i];
            if best.is_none() || score > best_score {
                best = Some(i);
                best_score = score;
            }
        }

        let Some(next) = best else {
            break;
        };
        picked[next] = true;
        selected.push(next);
        newest = next;
    }

    Ok(selected)
}

/// Select from a candidate pool, returning the chosen documents (text and
/// metadata preserved, embeddings dropped) in selection order with their
/// query relevance.
pub fn select_diverse(
    query_vector: &[f32],
    pool: &[Candidate],
    params: MmrParams,
) -> Result<Vec<Retrieved>> {
    let embeddings: Vec<&[f32]> = pool.iter().map(|c| c.embedding.as_slice()).collect();
    let order = select_indices(query_vector, &embeddings, params)?;

    Ok(order
        .into_iter()
        .enumerate()
        .map(|(rank, index)| Retrieved {
            rank: rank + 1,
            id: pool[index].id.clone(),
            text: pool[index].text.clone(),
            metadata: pool[index].metadata.clone(),
            relevance: cosine(query_vector, &pool[index].embedding),
        })
        .collect())
}
