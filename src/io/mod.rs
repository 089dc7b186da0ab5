pub mod fasta;
pub mod sam;

pub use fasta::{FastaReader, FastaWriter, SeqRecord};
pub use sam::{SamRecord, SamWriter};
