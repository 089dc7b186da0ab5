//! FASTA reading and writing.
//!
//! The reader wraps `bio::io::fasta` with gzip transparency (magic-byte
//! sniffing, `flate2` decompression) and streams records one at a time or in
//! batches. Sequences are case-normalized to uppercase on the way in. The
//! writer line-wraps at a configurable width (default 80).

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bio::io::fasta;
use flate2::read::MultiGzDecoder;

use crate::error::{MsaError, Result};

/// Default output line width.
pub const DEFAULT_LINE_WIDTH: usize = 80;

const READ_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// One sequence record. `seq` may be empty; downstream aligners treat an
/// empty side as all-insertions/deletions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeqRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

impl SeqRecord {
    pub fn new(id: impl Into<String>, seq: impl Into<Vec<u8>>) -> Self {
        SeqRecord {
            id: id.into(),
            desc: None,
            seq: seq.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
}

/// Check whether a file starts with the gzip magic bytes.
fn is_gzip(path: &Path) -> Result<bool> {
    let mut f = File::open(path).map_err(|e| MsaError::io(path, e))?;
    let mut magic = [0u8; 2];
    let n = f.read(&mut magic).map_err(|e| MsaError::io(path, e))?;
    Ok(n == 2 && magic == [0x1f, 0x8b])
}

/// Streaming FASTA reader with automatic gzip detection.
pub struct FastaReader {
    path: PathBuf,
    records: fasta::Records<BufReader<Box<dyn Read>>>,
}

impl FastaReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| MsaError::io(&path, e))?;

        let reader: Box<dyn Read> = if is_gzip(&path)? {
            log::debug!("gzip input detected: {}", path.display());
            Box::new(BufReader::with_capacity(
                READ_BUFFER_SIZE,
                MultiGzDecoder::new(file),
            ))
        } else {
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file))
        };

        Ok(FastaReader {
            path,
            records: fasta::Reader::new(reader).records(),
        })
    }

    /// Next record, uppercased, or `None` at EOF.
    pub fn next_record(&mut self) -> Result<Option<SeqRecord>> {
        match self.records.next() {
            None => Ok(None),
            Some(Err(e)) => Err(MsaError::parse(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
            Some(Ok(rec)) => {
                if rec.id().is_empty() {
                    return Err(MsaError::parse(format!(
                        "{}: record with empty id",
                        self.path.display()
                    )));
                }
                let mut seq = rec.seq().to_vec();
                seq.make_ascii_uppercase();
                Ok(Some(SeqRecord {
                    id: rec.id().to_string(),
                    desc: rec.desc().map(|d| d.to_string()),
                    seq,
                }))
            }
        }
    }

    /// Read up to `n` records; an empty result means EOF.
    pub fn read_batch(&mut self, n: usize) -> Result<Vec<SeqRecord>> {
        let mut batch = Vec::with_capacity(n.min(1024));
        while batch.len() < n {
            match self.next_record()? {
                Some(rec) => batch.push(rec),
                None => break,
            }
        }
        Ok(batch)
    }

    /// Drain the remaining records.
    pub fn read_all(&mut self) -> Result<Vec<SeqRecord>> {
        let mut all = Vec::new();
        while let Some(rec) = self.next_record()? {
            all.push(rec);
        }
        Ok(all)
    }
}

/// Line-wrapping FASTA writer.
pub struct FastaWriter {
    path: PathBuf,
    out: BufWriter<File>,
    line_width: usize,
}

impl FastaWriter {
    pub fn create(path: impl AsRef<Path>, line_width: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| MsaError::io(&path, e))?;
        Ok(FastaWriter {
            path,
            out: BufWriter::new(file),
            line_width: if line_width == 0 {
                DEFAULT_LINE_WIDTH
            } else {
                line_width
            },
        })
    }

    pub fn write(&mut self, rec: &SeqRecord) -> Result<()> {
        self.write_parts(&rec.id, rec.desc.as_deref(), &rec.seq)
    }

    pub fn write_parts(&mut self, id: &str, desc: Option<&str>, seq: &[u8]) -> Result<()> {
        // One buffered write per record.
        let mut buf = Vec::with_capacity(id.len() + seq.len() + seq.len() / self.line_width + 4);
        buf.push(b'>');
        buf.extend_from_slice(id.as_bytes());
        if let Some(desc) = desc {
            buf.push(b' ');
            buf.extend_from_slice(desc.as_bytes());
        }
        buf.push(b'\n');

        if seq.is_empty() {
            buf.push(b'\n');
        } else {
            for chunk in seq.chunks(self.line_width) {
                buf.extend_from_slice(chunk);
                buf.push(b'\n');
            }
        }

        self.out
            .write_all(&buf)
            .map_err(|e| MsaError::io(&self.path, e))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(|e| MsaError::io(&self.path, e))
    }
}
