//! Variant emission from pairwise CIGARs.
//!
//! SNPs are reported at every M/X/= column where the bases differ;
//! insertions and deletions are anchored at the preceding reference base,
//! following VCF convention. Records carry `SEQID=<query id>` and a
//! `TYPE={SNP|INS|DEL}` tag in INFO.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::alignment::cigar::{
    unit_code, unit_len, CigarUnit, OP_D, OP_EQ, OP_I, OP_M, OP_N, OP_P, OP_S, OP_X,
};
use crate::error::{MsaError, Result};

/// One variant line, already formatted except for the leading CHROM field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub chrom: String,
    /// 1-based position of the record's anchor base.
    pub pos: usize,
    pub ref_allele: String,
    pub alt_allele: String,
    pub seq_id: String,
    pub kind: VariantKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Snp,
    Ins,
    Del,
}

impl VariantKind {
    fn as_str(&self) -> &'static str {
        match self {
            VariantKind::Snp => "SNP",
            VariantKind::Ins => "INS",
            VariantKind::Del => "DEL",
        }
    }
}

impl Variant {
    /// Tab-separated VCF record line.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t.\t{}\t{}\t.\tPASS\tSEQID={}, TYPE={}",
            self.chrom,
            self.pos,
            self.ref_allele,
            self.alt_allele,
            self.seq_id,
            self.kind.as_str()
        )
    }
}

/// Extract SNP/INS/DEL variants of `qry_seq` relative to `ref_seq`.
///
/// Insertions before the first reference base cannot be anchored and are
/// skipped, matching the usual VCF treatment of leading indels.
pub fn cigar_variants(
    ref_id: &str,
    qry_id: &str,
    ref_seq: &[u8],
    qry_seq: &[u8],
    cigar: &[CigarUnit],
) -> Vec<Variant> {
    let mut variants = Vec::new();
    let mut ref_pos = 0usize;
    let mut qry_pos = 0usize;

    for &unit in cigar {
        let (code, len) = (unit_code(unit), unit_len(unit) as usize);
        match code {
            OP_M | OP_EQ | OP_X => {
                for _ in 0..len {
                    if ref_pos < ref_seq.len() && qry_pos < qry_seq.len() {
                        let rbase = ref_seq[ref_pos];
                        let qbase = qry_seq[qry_pos];
                        if rbase != qbase {
                            variants.push(Variant {
                                chrom: ref_id.to_string(),
                                pos: ref_pos + 1,
                                ref_allele: (rbase as char).to_string(),
                                alt_allele: (qbase as char).to_string(),
                                seq_id: qry_id.to_string(),
                                kind: VariantKind::Snp,
                            });
                        }
                    }
                    ref_pos += 1;
                    qry_pos += 1;
                }
            }
            OP_I => {
                if ref_pos > 0 && qry_pos + len <= qry_seq.len() {
                    let anchor = ref_seq[ref_pos - 1] as char;
                    let mut alt = anchor.to_string();
                    alt.push_str(std::str::from_utf8(&qry_seq[qry_pos..qry_pos + len]).unwrap_or(""));
                    variants.push(Variant {
                        chrom: ref_id.to_string(),
                        pos: ref_pos,
                        ref_allele: anchor.to_string(),
                        alt_allele: alt,
                        seq_id: qry_id.to_string(),
                        kind: VariantKind::Ins,
                    });
                }
                qry_pos += len;
            }
            OP_D => {
                if ref_pos > 0 && ref_pos + len <= ref_seq.len() {
                    let spanned =
                        std::str::from_utf8(&ref_seq[ref_pos - 1..ref_pos + len]).unwrap_or("");
                    variants.push(Variant {
                        chrom: ref_id.to_string(),
                        pos: ref_pos,
                        ref_allele: spanned.to_string(),
                        alt_allele: (ref_seq[ref_pos - 1] as char).to_string(),
                        seq_id: qry_id.to_string(),
                        kind: VariantKind::Del,
                    });
                }
                ref_pos += len;
            }
            OP_S => qry_pos += len,
            OP_N | OP_P => ref_pos += len,
            _ => {}
        }
    }

    variants
}

/// VCF file writer with the pipeline's fixed header.
pub struct VcfWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl VcfWriter {
    pub fn create(path: impl AsRef<Path>, source: &str, reference: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| MsaError::io(&path, e))?;
        let mut writer = VcfWriter {
            path,
            out: BufWriter::new(file),
        };
        writer.line(&format!(
            "##fileformat=VCFv4.1\n##source={}\n##reference={}\n\
             ##INFO=<ID=SEQID,Number=1,Type=String,Description=\"Query sequence ID\">\n\
             #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO",
            source, reference
        ))?;
        Ok(writer)
    }

    fn line(&mut self, text: &str) -> Result<()> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.write_all(b"\n"))
            .map_err(|e| MsaError::io(&self.path, e))
    }

    pub fn write_variant(&mut self, v: &Variant) -> Result<()> {
        self.line(&v.to_line())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(|e| MsaError::io(&self.path, e))
    }
}
