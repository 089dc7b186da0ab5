//! Dynamic-programming anchor chaining.
//!
//! Anchors are sorted by `(rid_ref, is_rev, pos_ref, pos_qry)` and scored
//! with the minimap2-style transition: the base gain is the new diagonal
//! coverage, penalized by the diagonal drift, the gap size, and a log2 term.
//! Chains are extracted greedily from the local maxima of the DP array and
//! the anchor vector is reordered so every chain occupies one contiguous run.

use crate::anchor::{Anchor, Anchors};

/// Chaining parameters.
#[derive(Debug, Clone, Copy)]
pub struct ChainParams {
    /// Maximum reference-axis distance between chained anchors.
    pub max_dist_x: i32,
    /// Maximum query-axis distance between chained anchors.
    pub max_dist_y: i32,
    /// Diagonal drift tolerance.
    pub bw: i32,
    /// Non-improving predecessors tolerated before short-circuiting.
    pub max_skip: i32,
    /// Predecessors examined per anchor.
    pub max_iter: i32,
    /// Minimum anchors per returned chain.
    pub min_cnt: i32,
    /// Minimum score per returned chain.
    pub min_score: i32,
    pub gap_penalty: f32,
    pub skip_penalty: f32,
}

impl Default for ChainParams {
    fn default() -> Self {
        ChainParams {
            max_dist_x: 5000,
            max_dist_y: 5000,
            bw: 500,
            max_skip: 25,
            max_iter: 5000,
            min_cnt: 3,
            min_score: 40,
            gap_penalty: 0.01,
            skip_penalty: 0.01,
        }
    }
}

/// One chain over a contiguous run `[start_idx, start_idx + cnt)` of the
/// reordered anchor array returned by [`chain_anchors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chain {
    pub score: i32,
    pub cnt: i32,
    pub start_idx: usize,
    pub ref_start: u32,
    pub ref_end: u32,
    pub qry_start: u32,
    pub qry_end: u32,
    pub rid_ref: u32,
    pub is_rev: bool,
}

pub type Chains = Vec<Chain>;

/// Transition score from predecessor `aj` to `ai`, or `None` when the pair
/// is not chainable.
pub fn chain_score(ai: &Anchor, aj: &Anchor, params: &ChainParams) -> Option<i32> {
    let dq = ai.pos_qry as i64 - aj.pos_qry as i64;
    let dr = ai.pos_ref as i64 - aj.pos_ref as i64;
    let dd = (dr - dq).unsigned_abs() as i64;

    if dq <= 0 || dq > params.max_dist_y as i64 || dd > params.bw as i64 {
        return None;
    }

    let base = dr.min(dq).min(ai.span as i64);
    let penalty = params.gap_penalty * dd as f32
        + params.skip_penalty * dr.min(dq) as f32
        + 0.5 * ((dd + 1) as f32).log2();
    let transition = (base as f32 - penalty) as i32;
    if transition <= 0 {
        None
    } else {
        Some(transition)
    }
}

/// Chain anchors with DP; `anchors` is reordered in place so that each
/// returned chain's anchors form a contiguous, position-ordered run.
/// Anchors not covered by any surviving chain are dropped. Chains come back
/// sorted by score descending.
pub fn chain_anchors(anchors: &mut Anchors, params: &ChainParams) -> Chains {
    if anchors.is_empty() {
        return Chains::new();
    }

    anchors.sort_unstable_by_key(|a| (a.rid_ref, a.is_rev, a.pos_ref, a.pos_qry));

    let n = anchors.len();
    let mut score = vec![0i32; n];
    let mut prev = vec![usize::MAX; n];

    for i in 0..n {
        let ai = anchors[i];
        score[i] = ai.span as i32;

        let mut n_skip = 0;
        let mut iters = 0;
        for j in (0..i).rev() {
            let aj = anchors[j];
            // Groups are contiguous after the sort; leaving the group or the
            // reference window ends the scan.
            if aj.rid_ref != ai.rid_ref || aj.is_rev != ai.is_rev {
                break;
            }
            if ai.pos_ref as i64 - aj.pos_ref as i64 > params.max_dist_x as i64 {
                break;
            }
            iters += 1;
            if iters > params.max_iter {
                break;
            }

            if let Some(t) = chain_score(&ai, &aj, params) {
                let candidate = score[j].saturating_add(t);
                if candidate > score[i] {
                    score[i] = candidate;
                    prev[i] = j;
                    n_skip = 0;
                    continue;
                }
            }
            n_skip += 1;
            if n_skip > params.max_skip {
                break;
            }
        }
    }

    // Greedy extraction from local maxima, highest score first.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_unstable_by_key(|&i| std::cmp::Reverse(score[i]));

    let mut used = vec![false; n];
    let mut raw_chains: Vec<(i32, Vec<usize>)> = Vec::new();

    for &end in &order {
        if used[end] || score[end] < params.min_score {
            continue;
        }

        let mut members = Vec::new();
        let mut cur = end;
        loop {
            if used[cur] {
                break;
            }
            used[cur] = true;
            members.push(cur);
            if prev[cur] == usize::MAX {
                break;
            }
            cur = prev[cur];
        }
        members.reverse();

        if (members.len() as i32) < params.min_cnt {
            continue;
        }
        raw_chains.push((score[end], members));
    }

    // Rebuild the anchor array: one contiguous run per chain.
    let mut reordered = Anchors::with_capacity(raw_chains.iter().map(|c| c.1.len()).sum());
    let mut chains = Chains::with_capacity(raw_chains.len());

    for (chain_score, members) in raw_chains {
        let start_idx = reordered.len();
        let first = anchors[members[0]];

        let mut ref_start = u32::MAX;
        let mut ref_end = 0u32;
        let mut qry_start = u32::MAX;
        let mut qry_end = 0u32;

        for &m in &members {
            let a = anchors[m];
            ref_start = ref_start.min(a.pos_ref);
            ref_end = ref_end.max(a.pos_ref + a.span);
            qry_start = qry_start.min(a.pos_qry);
            qry_end = qry_end.max(a.pos_qry + a.span);
            reordered.push(a);
        }

        chains.push(Chain {
            score: chain_score,
            cnt: members.len() as i32,
            start_idx,
            ref_start,
            ref_end,
            qry_start,
            qry_end,
            rid_ref: first.rid_ref,
            is_rev: first.is_rev,
        });
    }

    log::debug!(
        "chain_anchors: {} anchors -> {} chains (min_cnt={}, min_score={})",
        n,
        chains.len(),
        params.min_cnt,
        params.min_score
    );

    *anchors = reordered;
    chains
}

/// The anchors of one chain, in position order.
pub fn extract_chain_anchors<'a>(chain: &Chain, anchors: &'a [Anchor]) -> &'a [Anchor] {
    &anchors[chain.start_idx..chain.start_idx + chain.cnt as usize]
}

/// Highest-scoring chain, if any (chains are score-sorted on return).
pub fn best_chain(chains: &Chains) -> Option<&Chain> {
    chains.first()
}

/// Non-overlapping `(ref, qry)` base coverage of a chain.
pub fn chain_coverage(chain: &Chain, anchors: &[Anchor]) -> (u32, u32) {
    let members = extract_chain_anchors(chain, anchors);

    let mut ref_cov = 0u32;
    let mut last_ref_end = 0u32;
    let mut qry_cov = 0u32;
    let mut last_qry_end = 0u32;

    for a in members {
        let rb = a.pos_ref;
        let re = a.pos_ref + a.span;
        if rb >= last_ref_end {
            ref_cov += a.span;
        } else if re > last_ref_end {
            ref_cov += re - last_ref_end;
        }
        last_ref_end = last_ref_end.max(re);

        let qb = a.pos_qry;
        let qe = a.pos_qry + a.span;
        if qb >= last_qry_end {
            qry_cov += a.span;
        } else if qe > last_qry_end {
            qry_cov += qe - last_qry_end;
        }
        last_qry_end = last_qry_end.max(qe);
    }

    (ref_cov, qry_cov)
}
