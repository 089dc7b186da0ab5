//! Bottom-`s` MinHash sketching and the Jaccard/Mash/ANI estimators built on
//! top of it.
//!
//! A sketch is the `s` smallest distinct MurmurHash3 values over all valid
//! k-mers of a sequence. Two sketches with the same `k` support a Jaccard
//! estimate via a linear two-pointer merge, from which the Mash distance and
//! ANI are derived.

use crate::error::{MsaError, Result};
use crate::hash::{murmur3_x64, nt4, KmerRoller};

/// Default MurmurHash3 seed used throughout the pipeline.
pub const DEFAULT_SKETCH_SEED: u32 = 42;

/// An immutable bottom-`s` MinHash sketch.
///
/// Invariants: `hashes` is ascending and distinct, `hashes.len() <= s` at
/// construction time. Comparing sketches is only defined for equal `k`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sketch {
    pub k: usize,
    pub hashes: Vec<u64>,
}

impl Sketch {
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }
}

/// Sketch a sequence.
///
/// Rejects `k == 0`, `sketch_size == 0`, `k > 31`, or `|seq| < k` by
/// returning an empty sketch; an empty or short input is not an error. Bytes
/// outside A/C/G/T/U reset the rolling code, so k-mers never straddle an N.
pub fn sketch(
    seq: &[u8],
    k: usize,
    sketch_size: usize,
    noncanonical: bool,
    seed: u32,
) -> Sketch {
    let mut sk = Sketch {
        k,
        hashes: Vec::new(),
    };
    if k == 0 || sketch_size == 0 || k > 31 || seq.len() < k {
        return sk;
    }

    let mut roller = KmerRoller::new(k);
    sk.hashes.reserve(seq.len() + 1 - k);

    for &b in seq {
        let c = nt4(b);
        if c >= 4 {
            roller.reset();
            continue;
        }
        if roller.push(c) {
            let code = roller.code(noncanonical).to_le_bytes();
            sk.hashes.push(murmur3_x64(&code, seed));
        }
    }

    sk.hashes.sort_unstable();
    sk.hashes.dedup();
    sk.hashes.truncate(sketch_size);
    sk
}

/// Intersection size of two sorted, deduplicated hash lists.
fn intersection_size(a: &[u64], b: &[u64]) -> usize {
    let (mut i, mut j, mut inter) = (0usize, 0usize, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                inter += 1;
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    inter
}

/// Jaccard similarity `|A∩B| / |A∪B|` of two sketches.
///
/// Fails with `InvalidArgument` when the sketches were built with different
/// `k`. Both empty gives 1.0; exactly one empty gives 0.0.
pub fn jaccard(a: &Sketch, b: &Sketch) -> Result<f64> {
    if a.k != b.k {
        return Err(MsaError::invalid(format!(
            "jaccard: mismatched k ({} vs {})",
            a.k, b.k
        )));
    }
    if a.hashes.is_empty() && b.hashes.is_empty() {
        return Ok(1.0);
    }
    if a.hashes.is_empty() || b.hashes.is_empty() {
        return Ok(0.0);
    }

    let inter = intersection_size(&a.hashes, &b.hashes);
    let union = a.hashes.len() + b.hashes.len() - inter;
    Ok(inter as f64 / union as f64)
}

/// Mash distance `-ln(2j/(1+j))/k`; infinite at `j = 0`, zero at `j = 1`.
pub fn mash_distance(j: f64, k: usize) -> Result<f64> {
    if k == 0 {
        return Err(MsaError::invalid("mash_distance: k must be > 0"));
    }
    if !(j > 0.0) {
        return Ok(f64::INFINITY);
    }
    if j >= 1.0 {
        return Ok(0.0);
    }
    let x = (2.0 * j) / (1.0 + j);
    if !(x > 0.0) {
        return Ok(f64::INFINITY);
    }
    Ok(-x.ln() / k as f64)
}

/// Average nucleotide identity `clamp01((2j/(1+j))^(1/k))`.
pub fn ani(j: f64, k: usize) -> Result<f64> {
    if k == 0 {
        return Err(MsaError::invalid("ani: k must be > 0"));
    }
    if !(j > 0.0) {
        return Ok(0.0);
    }
    if j >= 1.0 {
        return Ok(1.0);
    }
    let x = (2.0 * j) / (1.0 + j);
    if !(x > 0.0) {
        return Ok(0.0);
    }
    Ok(x.powf(1.0 / k as f64).clamp(0.0, 1.0))
}

/// ANI from a Mash distance: `exp(-d)`, clamped to [0, 1].
pub fn ani_from_mash_distance(d: f64) -> f64 {
    if !d.is_finite() {
        return 0.0;
    }
    if d <= 0.0 {
        return 1.0;
    }
    (-d).exp().clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: u32 = DEFAULT_SKETCH_SEED;

    #[test]
    fn test_sketch_deterministic_and_sorted() {
        // Scenario: equal inputs yield bit-identical sketches.
        let seq = b"ACGTACGTACGTACGTACGTACGTACGTACGT";
        let a = sketch(seq, 15, 200, true, SEED);
        let b = sketch(seq, 15, 200, true, SEED);
        assert_eq!(a, b);
        assert!(!a.is_empty());
        assert!(a.hashes.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(jaccard(&a, &b).unwrap(), 1.0);
    }

    #[test]
    fn test_sketch_rejects_bad_parameters() {
        assert!(sketch(b"ACGTACGT", 0, 10, true, SEED).is_empty());
        assert!(sketch(b"ACGTACGT", 4, 0, true, SEED).is_empty());
        assert!(sketch(b"ACGTACGT", 32, 10, true, SEED).is_empty());
        assert!(sketch(b"ACG", 4, 10, true, SEED).is_empty());
        assert!(sketch(b"", 4, 10, true, SEED).is_empty());
    }

    #[test]
    fn test_sketch_size_cap() {
        let seq = b"ACGGTCAGTCAGGCATCAGCATGCAGTACGGCTA";
        let full = sketch(seq, 7, 1000, true, SEED);
        let capped = sketch(seq, 7, 5, true, SEED);
        assert!(full.len() > 5);
        assert_eq!(capped.len(), 5);
        // The cap keeps the smallest hashes.
        assert_eq!(&full.hashes[..5], &capped.hashes[..]);
    }

    #[test]
    fn test_sketch_skips_kmers_spanning_n() {
        // Scenario: only k-mers fully left or right of the NNNN block are
        // hashed, in ascending order.
        let k = 5usize;
        let seq = b"ACGTACGTNNNNACGTACGT";
        let sk = sketch(seq, k, 200, true, SEED);

        let mut expected = Vec::new();
        for side in [&seq[..8], &seq[12..]] {
            let mut roller = KmerRoller::new(k);
            for &b in side {
                if roller.push(nt4(b)) {
                    expected.push(murmur3_x64(&roller.code(true).to_le_bytes(), SEED));
                }
            }
        }
        expected.sort_unstable();
        expected.dedup();

        assert_eq!(sk.hashes, expected);
    }

    #[test]
    fn test_sketch_u_collapses_to_t() {
        let dna = sketch(b"ACGTACGTACGT", 4, 100, true, SEED);
        let rna = sketch(b"ACGUACGUACGU", 4, 100, true, SEED);
        assert_eq!(dna, rna);
    }

    #[test]
    fn test_jaccard_symmetry_and_bounds() {
        let a = sketch(b"ACGTACGTACGTGGCA", 4, 100, true, SEED);
        let b = sketch(b"ACGTACGTTTTTGGCA", 4, 100, true, SEED);
        let jab = jaccard(&a, &b).unwrap();
        let jba = jaccard(&b, &a).unwrap();
        assert_eq!(jab, jba);
        assert!((0.0..=1.0).contains(&jab));
        assert_eq!(jaccard(&a, &a).unwrap(), 1.0);
    }

    #[test]
    fn test_jaccard_disjoint_and_empty() {
        let a = Sketch {
            k: 4,
            hashes: vec![1, 2, 3],
        };
        let b = Sketch {
            k: 4,
            hashes: vec![4, 5, 6],
        };
        assert_eq!(jaccard(&a, &b).unwrap(), 0.0);

        let empty = Sketch {
            k: 4,
            hashes: vec![],
        };
        assert_eq!(jaccard(&empty, &empty).unwrap(), 1.0);
        assert_eq!(jaccard(&a, &empty).unwrap(), 0.0);
    }

    #[test]
    fn test_jaccard_mismatched_k_fails() {
        let a = sketch(b"ACGTACGT", 4, 10, true, SEED);
        let b = sketch(b"ACGTACGT", 5, 10, true, SEED);
        assert!(jaccard(&a, &b).is_err());
    }

    #[test]
    fn test_mash_distance_extremes() {
        assert_eq!(mash_distance(0.0, 15).unwrap(), f64::INFINITY);
        assert_eq!(mash_distance(1.0, 15).unwrap(), 0.0);
        let d = mash_distance(0.5, 15).unwrap();
        assert!(d > 0.0 && d.is_finite());
        assert!(mash_distance(0.5, 0).is_err());
    }

    #[test]
    fn test_ani_extremes_and_monotonicity() {
        assert_eq!(ani(0.0, 15).unwrap(), 0.0);
        assert_eq!(ani(1.0, 15).unwrap(), 1.0);
        let lo = ani(0.2, 15).unwrap();
        let hi = ani(0.8, 15).unwrap();
        assert!(lo < hi);
        assert!((0.0..=1.0).contains(&lo));
    }

    #[test]
    fn test_ani_from_mash_distance() {
        assert_eq!(ani_from_mash_distance(f64::INFINITY), 0.0);
        assert_eq!(ani_from_mash_distance(0.0), 1.0);
        let a = ani_from_mash_distance(0.05);
        assert!(a > 0.9 && a < 1.0);
    }
}
