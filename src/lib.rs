//! starmsa - reference-guided multiple sequence alignment for highly similar
//! nucleotide sequences.
//!
//! Queries are sketched with bottom-s MinHash, matched to the closest
//! reference by Jaccard similarity, aligned pairwise (wavefront by default),
//! and merged into one gap-consistent MSA through a two-pass insertion
//! protocol.

pub mod alignment;
pub mod anchor;
pub mod chain;
pub mod consensus;
pub mod error;
pub mod external;
pub mod hash;
pub mod io;
pub mod minimizer;
pub mod opts;
pub mod pipeline;
pub mod sketch;
pub mod vcf;

pub use error::{MsaError, Result};
pub use opts::MsaOpt;
pub use pipeline::{run_pipeline, RefMsaOrchestrator};
