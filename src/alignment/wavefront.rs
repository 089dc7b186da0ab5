//! Exact gap-affine wavefront alignment.
//!
//! For high-identity pairs the wavefront formulation explores O(s) diagonals
//! per score step instead of the full DP matrix, which is why it is the
//! preferred back-end for viral queries. Matches cost nothing; the score
//! grows only at mismatches and gaps, so near-identical genomes finish in a
//! handful of wavefront steps.
//!
//! Offsets follow the standard formulation: diagonal `k = h - v` where `h`
//! indexes the reference (text) and `v` the query (pattern); each wavefront
//! stores the furthest-reaching `h` per diagonal for the M, I (query gap
//! consumer) and D (reference gap consumer) components. All wavefronts are
//! retained for the backtrace; heuristics are disabled, the result is exact.

use super::banded_dp::global_align_dp;
use super::cigar::{push_merge, Cigar, OP_D, OP_I, OP_M};

/// Gap-affine penalties (match is free).
#[derive(Debug, Clone, Copy)]
pub struct WfPenalties {
    pub mismatch: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
}

impl Default for WfPenalties {
    fn default() -> Self {
        WfPenalties {
            mismatch: 3,
            gap_open: 4,
            gap_extend: 1,
        }
    }
}

const OFFSET_NULL: i32 = i32::MIN / 2;

/// One wavefront: furthest-reaching offsets for diagonals `lo..=hi`.
struct Wavefront {
    lo: i32,
    m: Vec<i32>,
    i: Vec<i32>,
    d: Vec<i32>,
}

impl Wavefront {
    fn new(lo: i32, hi: i32) -> Self {
        let width = (hi - lo + 1) as usize;
        Wavefront {
            lo,
            m: vec![OFFSET_NULL; width],
            i: vec![OFFSET_NULL; width],
            d: vec![OFFSET_NULL; width],
        }
    }

    #[inline]
    fn hi(&self) -> i32 {
        self.lo + self.m.len() as i32 - 1
    }

    #[inline]
    fn get(buf: &[i32], lo: i32, k: i32) -> i32 {
        if k < lo || k >= lo + buf.len() as i32 {
            OFFSET_NULL
        } else {
            buf[(k - lo) as usize]
        }
    }

    #[inline]
    fn m_at(&self, k: i32) -> i32 {
        Self::get(&self.m, self.lo, k)
    }

    #[inline]
    fn i_at(&self, k: i32) -> i32 {
        Self::get(&self.i, self.lo, k)
    }

    #[inline]
    fn d_at(&self, k: i32) -> i32 {
        Self::get(&self.d, self.lo, k)
    }
}

#[inline]
fn wf_at(wfs: &[Option<Wavefront>], s: i32) -> Option<&Wavefront> {
    if s < 0 {
        None
    } else {
        wfs.get(s as usize).and_then(|w| w.as_ref())
    }
}

/// Global alignment with the default penalties.
pub fn global_align_wf(ref_seq: &[u8], qry: &[u8]) -> Cigar {
    global_align_wf_with(ref_seq, qry, &WfPenalties::default())
}

/// Global alignment with explicit penalties.
pub fn global_align_wf_with(ref_seq: &[u8], qry: &[u8], pen: &WfPenalties) -> Cigar {
    let m = ref_seq.len() as i32;
    let n = qry.len() as i32;

    let mut cigar = Cigar::new();
    if m == 0 {
        push_merge(&mut cigar, OP_I, n as u32);
        return cigar;
    }
    if n == 0 {
        push_merge(&mut cigar, OP_D, m as u32);
        return cigar;
    }

    let x = pen.mismatch;
    let oe = pen.gap_open + pen.gap_extend;
    let e = pen.gap_extend;
    let k_end = m - n;

    // Everything-as-gaps is always admissible, so the score is bounded.
    let s_max = 2 * pen.gap_open + e * (m + n) + x;

    let valid = |h: i32, k: i32| -> bool { h >= 0 && h <= m && (h - k) >= 0 && (h - k) <= n };
    let extend = |mut h: i32, k: i32| -> i32 {
        let mut v = h - k;
        while h < m && v < n && ref_seq[h as usize] == qry[v as usize] {
            h += 1;
            v += 1;
        }
        h
    };

    let mut wfs: Vec<Option<Wavefront>> = Vec::new();

    // s = 0: matches along the main diagonal.
    let mut w0 = Wavefront::new(0, 0);
    w0.m[0] = extend(0, 0);
    let done_at_zero = w0.m[0] >= m && k_end == 0;
    wfs.push(Some(w0));

    let mut s_final = None;
    if done_at_zero {
        s_final = Some(0);
    }

    let mut s = 0;
    while s_final.is_none() {
        s += 1;
        if s > s_max {
            // Unreachable by construction; recover through the DP back-end.
            log::error!(
                "wavefront: exceeded score bound {} for {}x{} pair, falling back to DP",
                s_max,
                m,
                n
            );
            return global_align_dp(ref_seq, qry);
        }

        let src_mism = wf_at(&wfs, s - x);
        let src_open = wf_at(&wfs, s - oe);
        let src_ext = wf_at(&wfs, s - e);

        if src_mism.is_none() && src_open.is_none() && src_ext.is_none() {
            wfs.push(None);
            continue;
        }

        let mut lo = i32::MAX;
        let mut hi = i32::MIN;
        for src in [src_mism, src_open, src_ext].into_iter().flatten() {
            lo = lo.min(src.lo);
            hi = hi.max(src.hi());
        }
        lo -= 1;
        hi += 1;
        // Useful diagonals only.
        lo = lo.max(-n);
        hi = hi.min(m);
        if lo > hi {
            wfs.push(None);
            continue;
        }

        let mut wf = Wavefront::new(lo, hi);
        let mut reached_end = false;

        for k in lo..=hi {
            // Insertion (consumes query): same offset, from diagonal k + 1.
            let mut ins = OFFSET_NULL;
            if let Some(src) = src_open {
                ins = ins.max(src.m_at(k + 1));
            }
            if let Some(src) = src_ext {
                ins = ins.max(src.i_at(k + 1));
            }
            if ins != OFFSET_NULL && !valid(ins, k) {
                ins = OFFSET_NULL;
            }

            // Deletion (consumes ref): offset + 1, from diagonal k - 1.
            let mut del = OFFSET_NULL;
            if let Some(src) = src_open {
                del = del.max(src.m_at(k - 1));
            }
            if let Some(src) = src_ext {
                del = del.max(src.d_at(k - 1));
            }
            if del != OFFSET_NULL {
                del += 1;
                if !valid(del, k) {
                    del = OFFSET_NULL;
                }
            }

            // Mismatch: offset + 1 on the same diagonal.
            let mut mism = OFFSET_NULL;
            if let Some(src) = src_mism {
                let p = src.m_at(k);
                if p != OFFSET_NULL {
                    mism = p + 1;
                    if !valid(mism, k) {
                        mism = OFFSET_NULL;
                    }
                }
            }

            let idx = (k - lo) as usize;
            wf.i[idx] = ins;
            wf.d[idx] = del;

            let best = mism.max(ins).max(del);
            if best == OFFSET_NULL {
                continue;
            }
            let extended = extend(best, k);
            wf.m[idx] = extended;

            if k == k_end && extended >= m {
                reached_end = true;
            }
        }

        wfs.push(Some(wf));
        if reached_end {
            s_final = Some(s);
        }
    }

    // Backtrace. Runs are collected end-to-start, then reversed.
    #[derive(Clone, Copy, PartialEq)]
    enum Comp {
        M,
        I,
        D,
    }

    let mut runs: Vec<(u32, u32)> = Vec::new();
    let mut push_run = |code: u32, len: u32, runs: &mut Vec<(u32, u32)>| {
        if len == 0 {
            return;
        }
        if let Some(last) = runs.last_mut() {
            if last.0 == code {
                last.1 += len;
                return;
            }
        }
        runs.push((code, len));
    };

    let mut s = s_final.unwrap_or(0);
    let mut comp = Comp::M;
    let mut k = k_end;
    let mut h = m;

    loop {
        match comp {
            Comp::M => {
                if s == 0 {
                    // Only leading matches remain.
                    push_run(OP_M, h as u32, &mut runs);
                    break;
                }

                let cur = wf_at(&wfs, s).map(|w| (w.i_at(k), w.d_at(k))).unwrap_or((
                    OFFSET_NULL,
                    OFFSET_NULL,
                ));
                let (ins, del) = cur;
                let mism = match wf_at(&wfs, s - x) {
                    Some(src) => {
                        let p = src.m_at(k);
                        if p != OFFSET_NULL && valid(p + 1, k) {
                            p + 1
                        } else {
                            OFFSET_NULL
                        }
                    }
                    None => OFFSET_NULL,
                };

                let p = mism.max(ins).max(del);
                debug_assert!(p != OFFSET_NULL && p <= h);
                push_run(OP_M, (h - p) as u32, &mut runs);
                h = p;

                if del != OFFSET_NULL && p == del {
                    comp = Comp::D;
                } else if ins != OFFSET_NULL && p == ins {
                    comp = Comp::I;
                } else {
                    // Mismatch column is an M column too.
                    push_run(OP_M, 1, &mut runs);
                    s -= x;
                    h -= 1;
                }
            }
            Comp::I => {
                push_run(OP_I, 1, &mut runs);
                let from_ext = wf_at(&wfs, s - e).map(|w| w.i_at(k + 1)).unwrap_or(OFFSET_NULL);
                k += 1;
                if from_ext == h {
                    s -= e;
                } else {
                    s -= oe;
                    comp = Comp::M;
                }
            }
            Comp::D => {
                push_run(OP_D, 1, &mut runs);
                h -= 1;
                let from_ext = wf_at(&wfs, s - e).map(|w| w.d_at(k - 1)).unwrap_or(OFFSET_NULL);
                k -= 1;
                if from_ext == h {
                    s -= e;
                } else {
                    s -= oe;
                    comp = Comp::M;
                }
            }
        }
    }

    for &(code, len) in runs.iter().rev() {
        push_merge(&mut cigar, code, len);
    }
    cigar
}
