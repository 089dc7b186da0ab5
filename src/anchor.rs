//! Anchor collection: hash-joining reference and query minimizer hits under a
//! minimap2-style frequency-filter policy.
//!
//! The critical ordering property is that filtering happens *before*
//! occurrence expansion. A query hit that maps to a high-frequency reference
//! hash is either suppressed or sparsely sampled before any per-occurrence
//! anchors are materialized, so repeats never blow up the anchor vector.

use std::collections::HashMap;

use crate::minimizer::MinimizerHit;

/// One ref/query seed match. Both sides carried the same 56-bit hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Anchor {
    pub hash: u64,
    pub rid_ref: u32,
    pub pos_ref: u32,
    pub rid_qry: u32,
    pub pos_qry: u32,
    pub span: u32,
    /// XOR of the two underlying strands.
    pub is_rev: bool,
}

pub type Anchors = Vec<Anchor>;

/// Seeding filter parameters (defaults mirror the minimap2 CLI).
#[derive(Debug, Clone, Copy)]
pub struct SeedFilterParams {
    /// Ignore the most frequent `f_top_frac` fraction of distinct hashes.
    pub f_top_frac: f64,
    /// Lower clamp on the occurrence threshold.
    pub u_floor: usize,
    /// Upper clamp on the occurrence threshold.
    pub u_ceil: usize,
    /// Suppress query hashes occurring in more than this fraction of hits.
    pub q_occ_frac: f64,
    /// Sparse-sample high-frequency seeds every this many query bases.
    pub sample_every_bp: u32,
}

impl Default for SeedFilterParams {
    fn default() -> Self {
        SeedFilterParams {
            f_top_frac: 2e-4,
            u_floor: 10,
            u_ceil: 1_000_000,
            q_occ_frac: 0.01,
            sample_every_bp: 500,
        }
    }
}

/// Occurrence cutoff for the top `f_top_frac` fraction of distinct hashes.
///
/// Returns `usize::MAX` (no cutoff) when the fraction is zero or rounds down
/// to zero skipped hashes, and `1` in the degenerate `f >= 1` case. Uses
/// partial selection rather than a full sort.
pub fn occ_cutoff_top_frac(occs: &[usize], f_top_frac: f64) -> usize {
    if occs.is_empty() || f_top_frac <= 0.0 {
        return usize::MAX;
    }
    if f_top_frac >= 1.0 {
        return 1;
    }

    let n_skip = (f_top_frac * occs.len() as f64).floor() as usize;
    if n_skip == 0 {
        return usize::MAX;
    }

    let mut tmp = occs.to_vec();
    let (_, nth, _) = tmp.select_nth_unstable_by(n_skip - 1, |a, b| b.cmp(a));
    *nth
}

/// Final reference-side occurrence threshold:
/// `max(u_floor, min(u_ceil, top-fraction cutoff))`.
pub fn ref_occ_threshold(occs: &[usize], params: &SeedFilterParams) -> usize {
    let f_cutoff = occ_cutoff_top_frac(occs, params.f_top_frac);
    params.u_floor.max(params.u_ceil.min(f_cutoff))
}

/// Hash-join `ref_hits` and `qry_hits` into anchors under `params`.
///
/// The result is unordered with respect to `(pos_ref, pos_qry)`; callers sort
/// by diagonal or position as needed.
pub fn collect_anchors(
    ref_hits: &[MinimizerHit],
    qry_hits: &[MinimizerHit],
    params: &SeedFilterParams,
) -> Anchors {
    let mut anchors = Anchors::new();
    if ref_hits.is_empty() || qry_hits.is_empty() {
        return anchors;
    }

    // Sorted copy: (hash, rid, pos, strand). The packed layout makes the raw
    // (x, y) word pair almost that order; strand sits above rid in y, so the
    // explicit key is used instead.
    let mut sorted_ref = ref_hits.to_vec();
    sorted_ref.sort_unstable_by_key(|h| (h.hash(), h.rid(), h.pos(), h.strand()));

    // hash -> (start, count) runs plus per-distinct-hash occurrence counts.
    let mut index: HashMap<u64, (usize, usize)> = HashMap::with_capacity(sorted_ref.len());
    let mut occs: Vec<usize> = Vec::new();
    let mut start = 0usize;
    for i in 1..=sorted_ref.len() {
        if i == sorted_ref.len() || sorted_ref[i].hash() != sorted_ref[start].hash() {
            index.insert(sorted_ref[start].hash(), (start, i - start));
            occs.push(i - start);
            start = i;
        }
    }

    let ref_occ_thr = ref_occ_threshold(&occs, params);

    let mut qry_occ: HashMap<u64, usize> = HashMap::with_capacity(qry_hits.len());
    for h in qry_hits {
        *qry_occ.entry(h.hash()).or_insert(0) += 1;
    }
    let q_limit = if params.q_occ_frac > 0.0 {
        params.q_occ_frac * qry_hits.len() as f64
    } else {
        f64::INFINITY
    };

    anchors.reserve(qry_hits.len());

    for qh in qry_hits {
        let hash = qh.hash();
        let Some(&(start, count)) = index.get(&hash) else {
            continue;
        };

        // Query-side high-frequency suppression.
        if qry_occ[&hash] as f64 > q_limit {
            continue;
        }

        // Reference-side: sparse sampling for over-threshold hashes.
        if count > ref_occ_thr {
            if params.sample_every_bp == 0 || qh.pos() % params.sample_every_bp != 0 {
                continue;
            }
        }

        for rh in &sorted_ref[start..start + count] {
            anchors.push(Anchor {
                hash,
                rid_ref: rh.rid(),
                pos_ref: rh.pos(),
                rid_qry: qh.rid(),
                pos_qry: qh.pos(),
                span: rh.span().min(qh.span()),
                is_rev: rh.strand() != qh.strand(),
            });
        }
    }

    anchors
}

/// Diagonal key used for pre-chaining sorts.
///
/// Forward anchors use `ref - qry`. Reverse anchors would need the query
/// length to express `ref - qry_rc`; `ref + qry + span` is the monotone
/// surrogate (the `-qlen` term is constant within one query).
#[inline]
pub fn diagonal(a: &Anchor) -> i64 {
    if a.is_rev {
        a.pos_ref as i64 + a.pos_qry as i64 + a.span as i64
    } else {
        a.pos_ref as i64 - a.pos_qry as i64
    }
}

/// Sort by `(rid_ref, is_rev, diagonal, pos_ref, pos_qry)`.
pub fn sort_anchors_by_diagonal(anchors: &mut Anchors) {
    anchors.sort_unstable_by_key(|a| (a.rid_ref, a.is_rev, diagonal(a), a.pos_ref, a.pos_qry));
}

/// Sort by `(rid_ref, is_rev, pos_ref, pos_qry)`.
pub fn sort_anchors_by_position(anchors: &mut Anchors) {
    anchors.sort_unstable_by_key(|a| (a.rid_ref, a.is_rev, a.pos_ref, a.pos_qry));
}

/// Post-expansion filter: drop every anchor whose hash occurs more than
/// `max_occ` times in the anchor list itself. Coarser than the pre-expansion
/// policy of [`collect_anchors`]; useful after merging anchor sets.
pub fn filter_high_frequency_anchors(anchors: &mut Anchors, max_occ: usize) {
    if anchors.is_empty() || max_occ == 0 {
        return;
    }

    let mut counts: HashMap<u64, usize> = HashMap::new();
    for a in anchors.iter() {
        *counts.entry(a.hash).or_insert(0) += 1;
    }
    anchors.retain(|a| counts[&a.hash] <= max_occ);
}
