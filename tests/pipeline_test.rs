//! End-to-end orchestrator tests with an in-process MSA stub.
//!
//! The stub fulfils the external-tool contract (input FASTA in, aligned
//! equal-width FASTA out) by star-aligning every record against the first
//! one with the banded DP aligner, so no external binary is needed.

use std::collections::HashMap;
use std::path::Path;

use starmsa::alignment::cigar::{unit_code, unit_len, OP_D, OP_EQ, OP_I, OP_M, OP_X};
use starmsa::alignment::global_align_dp;
use starmsa::error::Result;
use starmsa::external::MsaTool;
use starmsa::io::fasta::{FastaReader, FastaWriter, SeqRecord};
use starmsa::io::sam::read_sam_file;
use starmsa::opts::MsaOpt;
use starmsa::pipeline::RefMsaOrchestrator;

/// In-process star aligner satisfying the `MsaTool` contract.
struct StubAligner;

fn star_align(records: &[SeqRecord]) -> Vec<SeqRecord> {
    let center = &records[0];
    let len = center.seq.len();

    let cigars: Vec<Vec<u32>> = records[1..]
        .iter()
        .map(|r| global_align_dp(&center.seq, &r.seq))
        .collect();

    // Widest insertion run before each center position.
    let mut max_ins = vec![0usize; len + 1];
    for cigar in &cigars {
        let mut ref_i = 0usize;
        for &unit in cigar {
            let (code, l) = (unit_code(unit), unit_len(unit) as usize);
            match code {
                OP_I => max_ins[ref_i] = max_ins[ref_i].max(l),
                OP_M | OP_EQ | OP_X | OP_D => ref_i += l,
                _ => {}
            }
        }
    }

    let mut out = Vec::with_capacity(records.len());

    let mut center_row = Vec::new();
    for i in 0..len {
        center_row.extend(std::iter::repeat(b'-').take(max_ins[i]));
        center_row.push(center.seq[i]);
    }
    center_row.extend(std::iter::repeat(b'-').take(max_ins[len]));
    out.push(SeqRecord::new(center.id.clone(), center_row));

    for (rec, cigar) in records[1..].iter().zip(&cigars) {
        let mut inserted: Vec<Vec<u8>> = vec![Vec::new(); len + 1];
        let mut base_at: Vec<u8> = vec![b'-'; len];
        let (mut ref_i, mut qry_i) = (0usize, 0usize);
        for &unit in cigar {
            let (code, l) = (unit_code(unit), unit_len(unit) as usize);
            match code {
                OP_I => {
                    inserted[ref_i].extend_from_slice(&rec.seq[qry_i..qry_i + l]);
                    qry_i += l;
                }
                OP_M | OP_EQ | OP_X => {
                    for _ in 0..l {
                        base_at[ref_i] = rec.seq[qry_i];
                        ref_i += 1;
                        qry_i += 1;
                    }
                }
                OP_D => ref_i += l,
                _ => {}
            }
        }

        let mut row = Vec::new();
        for i in 0..len {
            row.extend_from_slice(&inserted[i]);
            row.extend(std::iter::repeat(b'-').take(max_ins[i] - inserted[i].len()));
            row.push(base_at[i]);
        }
        row.extend_from_slice(&inserted[len]);
        row.extend(std::iter::repeat(b'-').take(max_ins[len] - inserted[len].len()));
        out.push(SeqRecord::new(rec.id.clone(), row));
    }

    out
}

impl MsaTool for StubAligner {
    fn align(&self, input: &Path, output: &Path, _threads: usize) -> Result<()> {
        let records = FastaReader::open(input)?.read_all()?;
        let aligned = star_align(&records);
        let mut w = FastaWriter::create(output, 80)?;
        for rec in &aligned {
            w.write(rec)?;
        }
        w.flush()
    }

    fn describe(&self) -> String {
        "in-process star aligner".to_string()
    }
}

fn write_fasta(path: &Path, records: &[(&str, &[u8])]) {
    let mut w = FastaWriter::create(path, 80).unwrap();
    for (id, seq) in records {
        w.write(&SeqRecord::new(id.to_string(), seq.to_vec())).unwrap();
    }
    w.flush().unwrap();
}

fn read_rows(path: &Path) -> Vec<SeqRecord> {
    FastaReader::open(path).unwrap().read_all().unwrap()
}

fn strip_gaps(seq: &[u8]) -> Vec<u8> {
    seq.iter().copied().filter(|&b| b != b'-').collect()
}

fn test_opts(threads: usize) -> MsaOpt {
    MsaOpt {
        threads,
        kmer_size: 7,
        kmer_window: 5,
        sketch_size: 500,
        batch_size: 4,
        ..MsaOpt::default()
    }
}

#[test]
fn test_two_pass_insertion_routing() {
    // Query with an insertion relative to the single reference lands in the
    // insertion stream on both passes.
    let dir = tempfile::tempdir().unwrap();
    let center_path = dir.path().join("center.fa");
    let input_path = dir.path().join("in.fa");
    let output_path = dir.path().join("out.fa");
    let work_path = dir.path().join("work");

    write_fasta(&center_path, &[("ref", b"AAAACCCCAAAA")]);
    write_fasta(&input_path, &[("q1", b"AAAACCCCGGGGAAAA")]);

    let mut orch = RefMsaOrchestrator::new(
        test_opts(1),
        Box::new(StubAligner),
        &input_path,
        Some(&work_path),
        Some(&center_path),
    )
    .unwrap();

    let stats = orch.align_queries(&input_path).unwrap();
    assert_eq!(stats.total_queries, 1);
    assert_eq!(stats.insertion_queries, 1);

    let ins = read_sam_file(work_path.join("results/aligned_insertion_0.sam")).unwrap();
    assert_eq!(ins.len(), 1);
    assert_eq!(ins[0].qname, "q1");
    assert_eq!(ins[0].rname, "ref");
    assert!(starmsa::alignment::cigar::has_insertion(&ins[0].cigar));

    let plain = read_sam_file(work_path.join("results/aligned_0.sam")).unwrap();
    assert!(plain.is_empty());

    orch.merge(&input_path, &output_path).unwrap();
    let rows = read_rows(&output_path);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, "ref");
    assert_eq!(rows[0].seq, b"AAAACCCC----AAAA");
    assert_eq!(rows[1].id, "q1");
    assert_eq!(rows[1].seq, b"AAAACCCCGGGGAAAA");
    orch.finish();
}

#[test]
fn test_merged_msa_is_rectangular_across_workers() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("in.fa");
    let output_path = dir.path().join("out.fa");

    let base = b"ACGGTCAGTTAGGCATCAGTCATGCAGATACGGCTAGCTAACGGTCAGTTAGGCATCAGT";
    let mut with_ins = base.to_vec();
    with_ins.splice(30..30, b"TTTTTT".iter().copied());
    let mut with_snp = base.to_vec();
    with_snp[10] = b'A';
    let with_del: Vec<u8> = base[..25].iter().chain(&base[31..]).copied().collect();

    write_fasta(
        &input_path,
        &[
            ("q0", base.as_slice()),
            ("q1", &with_ins),
            ("q2", &with_snp),
            ("q3", &with_del),
            ("q4", base.as_slice()),
        ],
    );

    let stats = starmsa::pipeline::run_pipeline(
        test_opts(3),
        Box::new(StubAligner),
        &input_path,
        &output_path,
        None,
        None,
    )
    .unwrap();
    assert_eq!(stats.total_queries, 5);

    let rows = read_rows(&output_path);
    // Center plus the five queries.
    assert_eq!(rows.len(), 6);
    let width = rows[0].seq.len();
    assert!(width >= base.len());
    for row in &rows {
        assert_eq!(row.seq.len(), width, "row '{}' is ragged", row.id);
    }

    // Every query row restores its input sequence after stripping gaps.
    let originals: HashMap<&str, Vec<u8>> = [
        ("q0", base.to_vec()),
        ("q1", with_ins.clone()),
        ("q2", with_snp.clone()),
        ("q3", with_del.clone()),
        ("q4", base.to_vec()),
    ]
    .into_iter()
    .collect();
    for row in &rows[1..] {
        assert_eq!(
            strip_gaps(&row.seq),
            originals[row.id.as_str()],
            "row '{}' does not restore its query",
            row.id
        );
    }
}

#[test]
fn test_keep_first_length_trims_to_center_width() {
    // With --keep-first-length every output row has exactly the center's
    // length.
    let dir = tempfile::tempdir().unwrap();
    let center_path = dir.path().join("center.fa");
    let input_path = dir.path().join("in.fa");
    let output_path = dir.path().join("out.fa");

    let center: Vec<u8> = b"ACGGTCAGTTAGGCATCAGTCATGCAGATACGGCTAGCTAACGGTCAGTTAGGCATCAGTCATGCAGATACGGCTAGCTAACGGTCAGTTAGGCATCAGT"
        .to_vec();
    assert_eq!(center.len(), 100);
    let mut q_ins = center.clone();
    q_ins.splice(50..50, b"GGGGGGGG".iter().copied());
    let mut q_snp = center.clone();
    q_snp[3] = b'T';

    write_fasta(&center_path, &[("center", &center)]);
    write_fasta(&input_path, &[("qi", &q_ins), ("qs", &q_snp)]);

    let opts = MsaOpt {
        keep_first_length: true,
        ..test_opts(2)
    };
    starmsa::pipeline::run_pipeline(
        opts,
        Box::new(StubAligner),
        &input_path,
        &output_path,
        None,
        Some(&center_path),
    )
    .unwrap();

    let rows = read_rows(&output_path);
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(row.seq.len(), 100, "row '{}' not trimmed to center", row.id);
    }
    assert_eq!(rows[0].seq, center);
    // The insertion columns were dropped, so the insertion query equals the
    // center again.
    let qi = rows.iter().find(|r| r.id == "qi").unwrap();
    assert_eq!(qi.seq, center);
}

#[test]
fn test_output_order_is_center_then_workers_in_index_order() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("in.fa");
    let output_path = dir.path().join("out.fa");

    let base = b"ACGGTCAGTTAGGCATCAGTCATGCAGATACGGCTAGCTA";
    write_fasta(
        &input_path,
        &[
            ("q0", base.as_slice()),
            ("q1", base.as_slice()),
            ("q2", base.as_slice()),
            ("q3", base.as_slice()),
        ],
    );

    starmsa::pipeline::run_pipeline(
        test_opts(2),
        Box::new(StubAligner),
        &input_path,
        &output_path,
        None,
        None,
    )
    .unwrap();

    // Dispatch is index mod T: worker 0 gets q0/q2, worker 1 gets q1/q3.
    let ids: Vec<String> = read_rows(&output_path).into_iter().map(|r| r.id).collect();
    assert_eq!(ids, ["consensus", "q0", "q2", "q1", "q3"]);
}

#[test]
fn test_worker_files_exist_per_thread() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("in.fa");
    let output_path = dir.path().join("out.fa");
    let work_path = dir.path().join("work");

    let base = b"ACGGTCAGTTAGGCATCAGTCATGCAGATACGGCTAGCTA";
    write_fasta(&input_path, &[("a", base.as_slice()), ("b", base.as_slice())]);

    let mut orch = RefMsaOrchestrator::new(
        test_opts(3),
        Box::new(StubAligner),
        &input_path,
        Some(&work_path),
        None,
    )
    .unwrap();
    orch.align_queries(&input_path).unwrap();

    for tid in 0..3 {
        assert!(work_path
            .join(format!("results/aligned_{}.sam", tid))
            .exists());
        assert!(work_path
            .join(format!("results/aligned_insertion_{}.sam", tid))
            .exists());
    }
    orch.merge(&input_path, &output_path).unwrap();
    orch.finish();
    assert!(work_path.exists()); // user-supplied workdir is never removed
}

#[test]
fn test_workdir_artifacts_layout() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("queries.fa");
    let output_path = dir.path().join("out.fa");
    let work_path = dir.path().join("work");

    let base = b"ACGGTCAGTTAGGCATCAGTCATGCAGATACGGCTAGCTA";
    let mut other = base.to_vec();
    other[5] = b'T';
    write_fasta(&input_path, &[("a", base.as_slice()), ("b", &other)]);

    starmsa::pipeline::run_pipeline(
        test_opts(1),
        Box::new(StubAligner),
        &input_path,
        &output_path,
        Some(&work_path),
        None,
    )
    .unwrap();

    assert!(work_path.join("data/raw/queries.fa").exists());
    assert!(work_path.join("data/clean/references.fasta").exists());
    assert!(work_path.join("data/clean/references_aligned.fasta").exists());
    assert!(work_path.join("data/clean/consensus.fasta").exists());
    assert!(work_path.join("data/clean/consensus.json").exists());
    assert!(work_path.join("results/aligned_0.sam").exists());
}

#[test]
fn test_empty_query_file_produces_center_only() {
    let dir = tempfile::tempdir().unwrap();
    let center_path = dir.path().join("center.fa");
    let input_path = dir.path().join("in.fa");
    let output_path = dir.path().join("out.fa");

    write_fasta(&center_path, &[("ref", b"ACGTACGTACGT")]);
    std::fs::write(&input_path, "").unwrap();

    starmsa::pipeline::run_pipeline(
        test_opts(1),
        Box::new(StubAligner),
        &input_path,
        &output_path,
        None,
        Some(&center_path),
    )
    .unwrap();

    let rows = read_rows(&output_path);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "ref");
    assert_eq!(rows[0].seq, b"ACGTACGTACGT");
}

#[test]
fn test_both_trim_flags_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("in.fa");
    write_fasta(&input_path, &[("a", b"ACGTACGT")]);

    let opts = MsaOpt {
        keep_first_length: true,
        keep_all_length: true,
        ..test_opts(1)
    };
    let err = RefMsaOrchestrator::new(opts, Box::new(StubAligner), &input_path, None, None);
    assert!(err.is_err());
}
