//! Pipeline options.
//!
//! One immutable value carries every knob the orchestrator needs; the CLI
//! fills it in `main` and nothing downstream reads globals.

use crate::alignment::AlignBackend;
use crate::error::{MsaError, Result};
use crate::io::fasta::DEFAULT_LINE_WIDTH;
use crate::sketch::DEFAULT_SKETCH_SEED;

/// Default records per streaming batch.
pub const DEFAULT_BATCH_SIZE: usize = 25_600;
/// Upper bound accepted for `--threads`.
pub const MAX_THREADS: usize = 100_000;

#[derive(Debug, Clone)]
pub struct MsaOpt {
    /// Minimizer/sketch k-mer size (4..=31).
    pub kmer_size: usize,
    /// Minimizer window, in k-mers.
    pub kmer_window: usize,
    /// MinHash sketch size.
    pub sketch_size: usize,
    /// Reference-pool size: the N longest inputs seed the consensus.
    pub cons_n: usize,
    /// Worker thread count (1..=100_000).
    pub threads: usize,
    /// Records per streaming batch; clamped to >= 1.
    pub batch_size: usize,
    /// Output FASTA line width.
    pub line_width: usize,
    /// MurmurHash3 seed for sketching.
    pub sketch_seed: u32,
    /// Skip canonicalization of k-mer codes.
    pub noncanonical: bool,
    /// Use the first reference verbatim as the center; trim the merged MSA
    /// to its coordinates.
    pub keep_first_length: bool,
    /// Additionally drop merged columns where any reference is gapped.
    pub keep_all_length: bool,
    /// Keep an auto-generated working directory after the run.
    pub save_workdir: bool,
    /// Pairwise aligner back-end.
    pub backend: AlignBackend,
}

impl Default for MsaOpt {
    fn default() -> Self {
        MsaOpt {
            kmer_size: 15,
            kmer_window: 10,
            sketch_size: 2000,
            cons_n: 1000,
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            batch_size: DEFAULT_BATCH_SIZE,
            line_width: DEFAULT_LINE_WIDTH,
            sketch_seed: DEFAULT_SKETCH_SEED,
            noncanonical: true,
            keep_first_length: false,
            keep_all_length: false,
            save_workdir: false,
            backend: AlignBackend::default(),
        }
    }
}

impl MsaOpt {
    /// Validate ranges and flag combinations; clamps `batch_size` to >= 1.
    pub fn validate(&mut self) -> Result<()> {
        if !(4..=31).contains(&self.kmer_size) {
            return Err(MsaError::invalid(format!(
                "kmer-size must be in 4..=31, got {}",
                self.kmer_size
            )));
        }
        if self.kmer_window == 0 || self.kmer_window >= 256 {
            return Err(MsaError::invalid(format!(
                "kmer-window must be in 1..=255, got {}",
                self.kmer_window
            )));
        }
        if self.sketch_size == 0 {
            return Err(MsaError::invalid("sketch-size must be > 0"));
        }
        if self.cons_n == 0 {
            return Err(MsaError::invalid("cons-n must be > 0"));
        }
        if self.threads == 0 || self.threads > MAX_THREADS {
            return Err(MsaError::invalid(format!(
                "threads must be in 1..={}, got {}",
                MAX_THREADS, self.threads
            )));
        }
        if self.keep_first_length && self.keep_all_length {
            return Err(MsaError::invalid(
                "--keep-first-length and --keep-all-length cannot be combined",
            ));
        }
        self.batch_size = self.batch_size.max(1);
        if self.line_width == 0 {
            self.line_width = DEFAULT_LINE_WIDTH;
        }
        Ok(())
    }
}
