//! Top-K-by-length selection and column-majority consensus.
//!
//! The selector keeps the K longest records of a stream in O(K) space with a
//! min-heap whose root is the worst currently kept record (shortest, or at
//! equal length the latest-arriving - earlier input wins ties). The
//! consensus reduces aligned rows column-by-column to a single sequence and
//! records the per-column base counts for the JSON side-file.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{MsaError, Result};
use crate::io::fasta::SeqRecord;

struct Item {
    len: usize,
    order: u64,
    rec: SeqRecord,
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.order == other.order
    }
}
impl Eq for Item {}

impl PartialOrd for Item {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Item {
    // "Greater" = better kept: longer, or same length but earlier.
    fn cmp(&self, other: &Self) -> Ordering {
        self.len
            .cmp(&other.len)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Streaming selector for the K longest records.
pub struct TopKLongestSelector {
    k: usize,
    order_counter: u64,
    heap: BinaryHeap<std::cmp::Reverse<Item>>,
}

impl TopKLongestSelector {
    pub fn new(k: usize) -> Self {
        TopKLongestSelector {
            k,
            order_counter: 0,
            heap: BinaryHeap::with_capacity(k.saturating_add(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.k
    }

    /// Offer one record. With the heap full, the candidate replaces the
    /// current worst only if it is `(length DESC, order ASC)`-better.
    pub fn consider(&mut self, rec: SeqRecord) {
        if self.k == 0 {
            return;
        }

        let cand = Item {
            len: rec.seq.len(),
            order: self.order_counter,
            rec,
        };
        self.order_counter += 1;

        if self.heap.len() < self.k {
            self.heap.push(std::cmp::Reverse(cand));
            return;
        }

        if let Some(worst) = self.heap.peek() {
            if cand > worst.0 {
                self.heap.pop();
                self.heap.push(std::cmp::Reverse(cand));
            }
        }
    }

    /// Drain the kept records, longest first (ties in input order).
    pub fn take_sorted_desc(&mut self) -> Vec<SeqRecord> {
        let heap = std::mem::take(&mut self.heap);
        let mut items: Vec<Item> = heap.into_iter().map(|r| r.0).collect();
        items.sort_by(|a, b| b.cmp(a));
        items.into_iter().map(|it| it.rec).collect()
    }
}

/// Per-column A/C/G/T/U counts, serialized to the consensus JSON side-file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCounts {
    #[serde(rename = "A")]
    pub a: u32,
    #[serde(rename = "C")]
    pub c: u32,
    #[serde(rename = "G")]
    pub g: u32,
    #[serde(rename = "T")]
    pub t: u32,
    #[serde(rename = "U")]
    pub u: u32,
}

impl ColumnCounts {
    fn add(&mut self, base: u8) {
        match base {
            b'A' | b'a' => self.a += 1,
            b'C' | b'c' => self.c += 1,
            b'G' | b'g' => self.g += 1,
            b'T' | b't' => self.t += 1,
            b'U' | b'u' => self.u += 1,
            _ => {}
        }
    }

    /// Majority base with A > C > G > T > U tie priority; a pure-gap column
    /// (all counts zero) yields A.
    fn winner(&self) -> u8 {
        let mut best = (b'A', self.a);
        for (base, count) in [(b'C', self.c), (b'G', self.g), (b'T', self.t), (b'U', self.u)] {
            if count > best.1 {
                best = (base, count);
            }
        }
        best.0
    }
}

/// Column-majority consensus over equal-length aligned rows.
///
/// `seq_limit > 0` caps how many input rows are consulted; `threads` and
/// `batch_size` shape the column partitioning without changing the result.
pub fn column_consensus(
    rows: &[SeqRecord],
    seq_limit: usize,
    threads: usize,
    batch_size: usize,
) -> Result<(Vec<u8>, Vec<ColumnCounts>)> {
    if rows.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let width = rows[0].seq.len();
    for r in rows {
        if r.seq.len() != width {
            return Err(MsaError::invalid(format!(
                "consensus: row '{}' has length {}, expected {}",
                r.id,
                r.seq.len(),
                width
            )));
        }
    }

    let consulted: &[SeqRecord] = if seq_limit > 0 && seq_limit < rows.len() {
        &rows[..seq_limit]
    } else {
        rows
    };

    let batch = batch_size.max(1).min(width.max(1));
    let count_range = |range: std::ops::Range<usize>| -> Vec<ColumnCounts> {
        let mut counts = vec![ColumnCounts::default(); range.len()];
        for row in consulted {
            for (slot, &base) in counts.iter_mut().zip(&row.seq[range.clone()]) {
                slot.add(base);
            }
        }
        counts
    };

    let ranges: Vec<std::ops::Range<usize>> = (0..width)
        .step_by(batch)
        .map(|start| start..(start + batch).min(width))
        .collect();

    let counts: Vec<ColumnCounts> = if threads == 1 {
        ranges.into_iter().flat_map(count_range).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| MsaError::invalid(format!("consensus: thread pool: {}", e)))?;
        pool.install(|| {
            ranges
                .into_par_iter()
                .map(count_range)
                .flatten_iter()
                .collect()
        })
    };

    let consensus: Vec<u8> = counts.iter().map(|c| c.winner()).collect();
    Ok((consensus, counts))
}

/// Write the per-column counts as the JSON side-file.
pub fn write_counts_json(path: impl AsRef<Path>, counts: &[ColumnCounts]) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).map_err(|e| MsaError::io(path, e))?;
    serde_json::to_writer(std::io::BufWriter::new(file), counts)
        .map_err(|e| MsaError::parse(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, seq: &[u8]) -> SeqRecord {
        SeqRecord::new(id, seq.to_vec())
    }

    #[test]
    fn test_topk_keeps_longest() {
        let mut sel = TopKLongestSelector::new(2);
        sel.consider(rec("short", b"AC"));
        sel.consider(rec("long", b"ACGTACGT"));
        sel.consider(rec("mid", b"ACGT"));
        sel.consider(rec("tiny", b"A"));

        let kept = sel.take_sorted_desc();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, "long");
        assert_eq!(kept[1].id, "mid");
    }

    #[test]
    fn test_topk_stability_on_equal_length() {
        // Earlier-arriving records win at equal length.
        let mut sel = TopKLongestSelector::new(2);
        sel.consider(rec("first", b"ACGT"));
        sel.consider(rec("second", b"ACGT"));
        sel.consider(rec("third", b"ACGT"));

        let kept = sel.take_sorted_desc();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, "first");
        assert_eq!(kept[1].id, "second");
    }

    #[test]
    fn test_topk_zero_capacity() {
        let mut sel = TopKLongestSelector::new(0);
        sel.consider(rec("x", b"ACGT"));
        assert!(sel.is_empty());
        assert!(sel.take_sorted_desc().is_empty());
    }

    #[test]
    fn test_topk_under_capacity() {
        let mut sel = TopKLongestSelector::new(10);
        sel.consider(rec("a", b"AC"));
        sel.consider(rec("b", b"ACGTAC"));
        let kept = sel.take_sorted_desc();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, "b");
    }

    #[test]
    fn test_consensus_majority_and_gap_column() {
        // Column 3 is G=2 over a gap; column 5 is pure-gap and yields A.
        let rows = vec![
            rec("s1", b"ACGT-"),
            rec("s2", b"AC-T-"),
            rec("s3", b"ACGT-"),
        ];
        let (consensus, counts) = column_consensus(&rows, 0, 2, 4).unwrap();
        assert_eq!(consensus, b"ACGTA");
        assert_eq!(counts.len(), 5);
        assert_eq!(counts[2].g, 2);
        assert_eq!(counts[4], ColumnCounts::default());
    }

    #[test]
    fn test_consensus_tie_priority() {
        // A=1 vs C=1: A wins. C=1 vs T=1: C wins. T=1 vs U=1: T wins.
        let rows = vec![rec("r1", b"ACTU"), rec("r2", b"CTUT")];
        let (consensus, _) = column_consensus(&rows, 0, 1, 64).unwrap();
        assert_eq!(consensus, b"ACTT");
    }

    #[test]
    fn test_consensus_u_counted_separately() {
        let rows = vec![rec("r1", b"UU"), rec("r2", b"UT")];
        let (consensus, counts) = column_consensus(&rows, 0, 1, 64).unwrap();
        assert_eq!(counts[0].u, 2);
        assert_eq!(counts[1].t, 1);
        assert_eq!(counts[1].u, 1);
        // Column 1: U=2 wins; column 2: T=1 vs U=1, T has priority.
        assert_eq!(consensus, b"UT");
    }

    #[test]
    fn test_consensus_seq_limit() {
        let rows = vec![rec("r1", b"AAAA"), rec("r2", b"CCCC"), rec("r3", b"CCCC")];
        // Only the first row consulted.
        let (consensus, _) = column_consensus(&rows, 1, 1, 64).unwrap();
        assert_eq!(consensus, b"AAAA");
    }

    #[test]
    fn test_consensus_parameters_do_not_change_result() {
        let rows = vec![
            rec("a", b"ACGTACGTACGTAC"),
            rec("b", b"ACGAACGTAC-TAC"),
            rec("c", b"ACGTACG--CGTAC"),
        ];
        let (base, base_counts) = column_consensus(&rows, 0, 1, 1).unwrap();
        for (threads, batch) in [(2usize, 3usize), (4, 14), (1, 100)] {
            let (c, counts) = column_consensus(&rows, 0, threads, batch).unwrap();
            assert_eq!(c, base, "threads={} batch={}", threads, batch);
            assert_eq!(counts, base_counts);
        }
    }

    #[test]
    fn test_consensus_rejects_ragged_rows() {
        let rows = vec![rec("a", b"ACGT"), rec("b", b"AC")];
        assert!(column_consensus(&rows, 0, 1, 64).is_err());
    }

    #[test]
    fn test_counts_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.json");
        let counts = vec![
            ColumnCounts {
                a: 3,
                ..ColumnCounts::default()
            },
            ColumnCounts {
                c: 1,
                t: 2,
                ..ColumnCounts::default()
            },
        ];
        write_counts_json(&path, &counts).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let back: Vec<ColumnCounts> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, counts);
        assert!(text.contains("\"A\":3"));
    }
}
