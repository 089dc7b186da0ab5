//! Pairwise aligner facade.
//!
//! Three back-ends behind one CIGAR-returning contract: for every produced
//! CIGAR, `ref_length(c) == |ref|` and `qry_length(c) == |query|`. The
//! orchestrator defaults to the wavefront back-end; back-end specific
//! parameter structs stay inside their modules and never leak through this
//! surface.

pub mod banded_dp;
pub mod cigar;
pub mod segmented;
pub mod wavefront;

pub use banded_dp::{extend_align_dp, global_align_dp};
pub use segmented::global_align_segmented;
pub use wavefront::global_align_wf;

use crate::anchor::{collect_anchors, SeedFilterParams};
use crate::minimizer::extract;

/// Alignment back-end selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignBackend {
    /// Banded gap-affine dynamic programming.
    BandedDp,
    /// Exact gap-affine wavefront (preferred for high-identity queries).
    #[default]
    Wavefront,
    /// Chain-seeded segmented DP with whole-pair fallback.
    AnchorSegmented,
}

impl std::fmt::Display for AlignBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlignBackend::BandedDp => write!(f, "banded-dp"),
            AlignBackend::Wavefront => write!(f, "wavefront"),
            AlignBackend::AnchorSegmented => write!(f, "anchor-segmented"),
        }
    }
}

// Seeding defaults for the segmented back-end when invoked through the
// facade (callers wanting control pass anchors to global_align_segmented).
const FACADE_SEED_K: usize = 15;
const FACADE_SEED_W: usize = 10;

/// Align `qry` against `ref_seq` with the selected back-end.
pub fn align(backend: AlignBackend, ref_seq: &[u8], qry: &[u8]) -> cigar::Cigar {
    match backend {
        AlignBackend::BandedDp => global_align_dp(ref_seq, qry),
        AlignBackend::Wavefront => global_align_wf(ref_seq, qry),
        AlignBackend::AnchorSegmented => {
            let ref_hits = extract(ref_seq, FACADE_SEED_K, FACADE_SEED_W, true);
            let qry_hits = extract(qry, FACADE_SEED_K, FACADE_SEED_W, true);
            let anchors = collect_anchors(&ref_hits, &qry_hits, &SeedFilterParams::default());
            global_align_segmented(ref_seq, qry, anchors)
        }
    }
}
