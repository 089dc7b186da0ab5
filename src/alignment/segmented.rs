//! Anchor-driven segmented alignment.
//!
//! The best anchor chain splits the pair into alternating "anchor span" and
//! "gap between anchors" segments (plus the two flanks); each segment goes
//! through the banded DP aligner and the pieces are merged back together.
//! Cursors advance by what the returned CIGAR actually consumed, not by the
//! nominal anchor span - the correctness guard for when DP comes back with a
//! different shape than the anchors suggested.

use crate::anchor::Anchors;
use crate::chain::{best_chain, chain_anchors, extract_chain_anchors, ChainParams};

use super::banded_dp::global_align_dp;
use super::cigar::{push_merge, qry_length, ref_length, Cigar, OP_D, OP_I};

/// Align one segment pair and append it to the accumulator, returning the
/// `(ref, qry)` lengths actually consumed. A CIGAR that fails to match its
/// substring lengths is replaced by the forced I+D fallback for that segment
/// only, which keeps the running totals consistent.
fn align_segment(acc: &mut Cigar, ref_seg: &[u8], qry_seg: &[u8]) -> (usize, usize) {
    if ref_seg.is_empty() && qry_seg.is_empty() {
        return (0, 0);
    }

    let piece = global_align_dp(ref_seg, qry_seg);
    if ref_length(&piece) == ref_seg.len() && qry_length(&piece) == qry_seg.len() {
        let consumed = (ref_length(&piece), qry_length(&piece));
        super::cigar::append_with_merge(acc, &piece);
        return consumed;
    }

    log::warn!(
        "segmented: segment cigar consumed {}x{} of a {}x{} pair, forcing I+D",
        ref_length(&piece),
        qry_length(&piece),
        ref_seg.len(),
        qry_seg.len()
    );
    push_merge(acc, OP_I, qry_seg.len() as u32);
    push_merge(acc, OP_D, ref_seg.len() as u32);
    (ref_seg.len(), qry_seg.len())
}

/// Global alignment seeded by pre-collected anchors.
///
/// Chains the anchors first; with no admissible chain (or a reverse-strand
/// best chain, which the reference-guided pipeline never wants) the whole
/// pair falls through to [`global_align_dp`]. A final length check guards
/// the assembled CIGAR; on mismatch the assembly is discarded wholesale.
pub fn global_align_segmented(ref_seq: &[u8], qry: &[u8], mut anchors: Anchors) -> Cigar {
    let params = ChainParams::default();
    let chains = chain_anchors(&mut anchors, &params);

    let Some(best) = best_chain(&chains) else {
        return global_align_dp(ref_seq, qry);
    };
    if best.is_rev {
        log::debug!("segmented: best chain is reverse-strand, using whole-pair DP");
        return global_align_dp(ref_seq, qry);
    }

    let mut chain_members = extract_chain_anchors(best, &anchors).to_vec();
    chain_members.sort_unstable_by_key(|a| (a.pos_qry, a.pos_ref));

    let mut acc = Cigar::new();
    let mut ref_cursor = 0usize;
    let mut qry_cursor = 0usize;

    for a in &chain_members {
        let a_ref = a.pos_ref as usize;
        let a_qry = a.pos_qry as usize;
        // Anchors overtaken by a previous segment's actual consumption are
        // stale; skip them.
        if a_ref < ref_cursor || a_qry < qry_cursor {
            continue;
        }

        // Gap between the cursors and this anchor.
        let (dr, dq) = align_segment(
            &mut acc,
            &ref_seq[ref_cursor..a_ref],
            &qry[qry_cursor..a_qry],
        );
        ref_cursor += dr;
        qry_cursor += dq;

        // The anchor span itself.
        let end_ref = (a_ref + a.span as usize).min(ref_seq.len());
        let end_qry = (a_qry + a.span as usize).min(qry.len());
        if end_ref <= ref_cursor || end_qry <= qry_cursor {
            continue;
        }
        let (dr, dq) = align_segment(
            &mut acc,
            &ref_seq[ref_cursor..end_ref],
            &qry[qry_cursor..end_qry],
        );
        ref_cursor += dr;
        qry_cursor += dq;
    }

    // Right flank.
    let (dr, dq) = align_segment(&mut acc, &ref_seq[ref_cursor..], &qry[qry_cursor..]);
    ref_cursor += dr;
    qry_cursor += dq;

    if ref_length(&acc) != ref_seq.len() || qry_length(&acc) != qry.len() {
        log::error!(
            "segmented: assembled cigar consumed {}x{} of a {}x{} pair, discarding",
            ref_length(&acc),
            qry_length(&acc),
            ref_seq.len(),
            qry.len()
        );
        return global_align_dp(ref_seq, qry);
    }

    debug_assert_eq!(ref_cursor, ref_seq.len());
    debug_assert_eq!(qry_cursor, qry.len());
    acc
}
