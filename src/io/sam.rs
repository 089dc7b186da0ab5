//! Minimal SAM writing and read-back for the per-worker intermediates.
//!
//! The MSA pipeline only needs the fixed-field subset: every record carries
//! `pos=1 mapq=60 flag=0 rnext=* pnext=0 tlen=0 seq=* qual=*`; qname, rname
//! and the CIGAR are the payload.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::alignment::cigar::{self, Cigar};
use crate::error::{MsaError, Result};

/// Header line written to every per-worker file.
pub const SAM_HEADER: &str = "@HD\tVN:1.6\tSO:unknown";

/// Append-only SAM writer for one worker stream.
pub struct SamWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl SamWriter {
    /// Create the file and emit the header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| MsaError::io(&path, e))?;
        let mut writer = SamWriter {
            path,
            out: BufWriter::new(file),
        };
        writer.write_line(SAM_HEADER)?;
        Ok(writer)
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        self.out
            .write_all(line.as_bytes())
            .and_then(|_| self.out.write_all(b"\n"))
            .map_err(|e| MsaError::io(&self.path, e))
    }

    /// Write one alignment record with the pipeline's fixed fields.
    pub fn write_record(&mut self, qname: &str, rname: &str, cigar: &[u32]) -> Result<()> {
        let cigar_text = if cigar.is_empty() {
            "*".to_string()
        } else {
            cigar::to_string(cigar)
        };
        let line = format!(
            "{}\t0\t{}\t1\t60\t{}\t*\t0\t0\t*\t*",
            qname, rname, cigar_text
        );
        self.write_line(&line)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(|e| MsaError::io(&self.path, e))
    }
}

/// Parsed subset of one SAM record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamRecord {
    pub qname: String,
    pub rname: String,
    pub cigar: Cigar,
}

/// Read every record of one per-worker SAM file, in file order.
pub fn read_sam_file(path: impl AsRef<Path>) -> Result<Vec<SamRecord>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| MsaError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| MsaError::io(path, e))?;
        if line.is_empty() || line.starts_with('@') {
            continue;
        }

        let mut fields = line.split('\t');
        let qname = fields.next();
        let _flag = fields.next();
        let rname = fields.next();
        let _pos = fields.next();
        let _mapq = fields.next();
        let cigar_text = fields.next();

        let (Some(qname), Some(rname), Some(cigar_text)) = (qname, rname, cigar_text) else {
            return Err(MsaError::parse(format!(
                "{}:{}: truncated SAM record",
                path.display(),
                lineno + 1
            )));
        };

        let cigar = if cigar_text == "*" {
            Cigar::new()
        } else {
            cigar::from_string(cigar_text).map_err(|_| {
                MsaError::parse(format!(
                    "{}:{}: bad CIGAR '{}'",
                    path.display(),
                    lineno + 1,
                    cigar_text
                ))
            })?
        };

        records.push(SamRecord {
            qname: qname.to_string(),
            rname: rname.to_string(),
            cigar,
        });
    }
    Ok(records)
}
