//! Column-space algebra for the merge pass.
//!
//! The merge re-expresses every query row in one final column layout. Two
//! gapped spaces exist by then: the aligned-reference columns built at
//! indexing time, and the insertion-pool MSA columns built from the
//! externally aligned pool. Both are described by M/D CIGARs over a common
//! base sequence (the center), so the final layout is the union of their gap
//! structures and every row reaches it by CIGAR composition.

use crate::alignment::cigar::{
    push_merge, qry_length, ref_length, unit_code, unit_len, Cigar, CigarUnit, OP_D, OP_EQ, OP_H,
    OP_I, OP_M, OP_N, OP_P, OP_S, OP_X,
};
use crate::error::{MsaError, Result};

/// Convert an aligned (gapped) row into its M/D column CIGAR: M at a base,
/// D at a `-`.
pub fn row_to_md_cigar(row: &[u8]) -> Cigar {
    let mut cigar = Cigar::new();
    for &b in row {
        if b == b'-' {
            push_merge(&mut cigar, OP_D, 1);
        } else {
            push_merge(&mut cigar, OP_M, 1);
        }
    }
    cigar
}

/// Identity mapping for an ungapped sequence of `len` bases.
pub fn identity_cigar(len: usize) -> Cigar {
    let mut cigar = Cigar::new();
    push_merge(&mut cigar, OP_M, len as u32);
    cigar
}

/// Compose `inner` (query -> space A) with `outer` (A -> space B, M/D only).
///
/// `outer`'s base count must equal `ref_length(inner)`; the result maps the
/// query into space B. Query-only ops of `inner` (I, S) pass through as
/// insertions; H is dropped.
pub fn compose_with_msa(inner: &[CigarUnit], outer: &[CigarUnit]) -> Result<Cigar> {
    if qry_length(outer) != ref_length(inner) {
        return Err(MsaError::AlignmentInconsistency {
            context: format!(
                "compose: outer spans {} bases but inner consumes {}",
                qry_length(outer),
                ref_length(inner)
            ),
        });
    }

    let mut acc = Cigar::new();
    let mut inner_iter = inner.iter().map(|&u| (unit_code(u), unit_len(u)));
    let mut pending: Option<(u32, u32)> = None;

    let mut next_inner = |pending: &mut Option<(u32, u32)>| -> Option<(u32, u32)> {
        pending.take().or_else(|| inner_iter.next())
    };

    for &unit in outer {
        let (ocode, olen) = (unit_code(unit), unit_len(unit));
        match ocode {
            OP_D | OP_N | OP_P => {
                push_merge(&mut acc, OP_D, olen);
            }
            OP_M | OP_EQ | OP_X => {
                let mut need = olen;
                while need > 0 {
                    let Some((code, len)) = next_inner(&mut pending) else {
                        return Err(MsaError::AlignmentInconsistency {
                            context: "compose: inner cigar exhausted early".to_string(),
                        });
                    };
                    match code {
                        OP_M | OP_EQ | OP_X => {
                            let take = need.min(len);
                            push_merge(&mut acc, OP_M, take);
                            need -= take;
                            if len > take {
                                pending = Some((code, len - take));
                            }
                        }
                        OP_D | OP_N | OP_P => {
                            let take = need.min(len);
                            push_merge(&mut acc, OP_D, take);
                            need -= take;
                            if len > take {
                                pending = Some((code, len - take));
                            }
                        }
                        OP_I | OP_S => push_merge(&mut acc, OP_I, len),
                        OP_H => {}
                        _ => {}
                    }
                }
            }
            _ => {
                return Err(MsaError::AlignmentInconsistency {
                    context: "compose: outer cigar must contain only M/D columns".to_string(),
                })
            }
        }
    }

    // Trailing query-only ops.
    while let Some((code, len)) = next_inner(&mut pending) {
        match code {
            OP_I | OP_S => push_merge(&mut acc, OP_I, len),
            OP_H => {}
            _ => {
                return Err(MsaError::AlignmentInconsistency {
                    context: "compose: inner cigar has unconsumed reference ops".to_string(),
                })
            }
        }
    }

    debug_assert_eq!(ref_length(&acc), ref_length(outer));
    debug_assert_eq!(qry_length(&acc), qry_length(inner));
    Ok(acc)
}

/// Gap run lengths before each base of an M/D CIGAR: `profile[i]` counts the
/// gap columns between base `i-1` and base `i` (index 0 = leading, index L =
/// trailing), where L is the base count.
fn gap_profile(md: &[CigarUnit]) -> Result<Vec<u32>> {
    let bases = qry_length(md);
    let mut profile = vec![0u32; bases + 1];
    let mut pos = 0usize;

    for &unit in md {
        let (code, len) = (unit_code(unit), unit_len(unit));
        match code {
            OP_M | OP_EQ | OP_X => pos += len as usize,
            OP_D | OP_N | OP_P => profile[pos] += len,
            _ => {
                return Err(MsaError::AlignmentInconsistency {
                    context: "gap profile: expected an M/D-only cigar".to_string(),
                })
            }
        }
    }
    Ok(profile)
}

/// Union of two gapped spaces over the same base sequence.
///
/// `a` and `b` are M/D CIGARs mapping the base sequence into spaces A and B
/// (`qry_length(a) == qry_length(b)`). Returns `(a_to_union, b_to_union)`:
/// M/D CIGARs lifting rows of either space into the union layout, where at
/// every junction A's gap columns precede B's.
pub fn union_spaces(a: &[CigarUnit], b: &[CigarUnit]) -> Result<(Cigar, Cigar)> {
    if qry_length(a) != qry_length(b) {
        return Err(MsaError::AlignmentInconsistency {
            context: format!(
                "space union: base lengths differ ({} vs {})",
                qry_length(a),
                qry_length(b)
            ),
        });
    }

    let ga = gap_profile(a)?;
    let gb = gap_profile(b)?;
    let bases = ga.len() - 1;

    let mut a_to_union = Cigar::new();
    let mut b_to_union = Cigar::new();

    for i in 0..=bases {
        push_merge(&mut a_to_union, OP_M, ga[i]);
        push_merge(&mut a_to_union, OP_D, gb[i]);
        push_merge(&mut b_to_union, OP_D, ga[i]);
        push_merge(&mut b_to_union, OP_M, gb[i]);
        if i < bases {
            push_merge(&mut a_to_union, OP_M, 1);
            push_merge(&mut b_to_union, OP_M, 1);
        }
    }

    Ok((a_to_union, b_to_union))
}

/// Drop the masked-out columns of an aligned row.
pub fn apply_column_mask(row: &[u8], keep: &[bool]) -> Vec<u8> {
    debug_assert_eq!(row.len(), keep.len());
    row.iter()
        .zip(keep)
        .filter(|&(_, &k)| k)
        .map(|(&b, _)| b)
        .collect()
}
