//! Reference-guided MSA orchestration.
//!
//! Lifecycle: `Constructed -> Indexed` happens in [`RefMsaOrchestrator::new`]
//! (reference pool, sketches, minimizer lists, center/consensus),
//! `Indexed -> Aligning -> AlignDone` in [`RefMsaOrchestrator::align_queries`]
//! (streamed batches over `T` workers with the two-pass insertion protocol),
//! and `AlignDone -> Merged` in [`RefMsaOrchestrator::merge`] (insertion-pool
//! MSA, column-space union, trimming, final FASTA).
//!
//! # Worker model
//!
//! One producer streams the query FASTA in batches and dispatches record `i`
//! of a batch to worker `i % T`; each worker owns its two SAM writers
//! exclusively. A flush marker plus acknowledgements form the per-batch
//! fork-join barrier, so the merged output is deterministic for a fixed
//! worker count, batch size and input order.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::alignment::cigar::{self, has_insertion, pad_query_to_ref, ref_length, Cigar};
use crate::alignment::{align, global_align_segmented, AlignBackend};
use crate::anchor::{collect_anchors, SeedFilterParams};
use crate::consensus::{column_consensus, write_counts_json, TopKLongestSelector};
use crate::error::{MsaError, Result};
use crate::external::MsaTool;
use crate::io::fasta::{FastaReader, FastaWriter, SeqRecord};
use crate::io::sam::{read_sam_file, SamRecord, SamWriter};
use crate::minimizer::{extract, extract_with_rid, MinimizerHits};
use crate::opts::MsaOpt;
use crate::sketch::{jaccard, sketch, Sketch};

use super::merge::{
    apply_column_mask, compose_with_msa, identity_cigar, row_to_md_cigar, union_spaces,
};
use super::workdir::Workdir;

/// Orchestrator lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Indexed,
    AlignDone,
    Merged,
}

/// Aggregate statistics from the alignment pass.
#[derive(Debug, Clone, Default)]
pub struct MsaStats {
    pub total_queries: usize,
    pub insertion_queries: usize,
    pub batches: usize,
    pub wall_secs: f64,
}

impl fmt::Display for MsaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "aligned {} queries ({} via the insertion path) in {} batches, {:.2}s",
            self.total_queries, self.insertion_queries, self.batches, self.wall_secs
        )
    }
}

enum WorkItem {
    Query(SeqRecord),
    Flush,
}

#[derive(Default)]
struct WorkerOutcome {
    processed: usize,
    insertions: usize,
}

/// The reference-guided MSA pipeline.
pub struct RefMsaOrchestrator {
    opts: MsaOpt,
    workdir: Workdir,
    tool: Box<dyn MsaTool>,
    refs: Vec<SeqRecord>,
    ref_sketches: Vec<Sketch>,
    ref_minimizers: Vec<MinimizerHits>,
    /// Aligned-reference intermediate (present with more than one reference).
    ref_msa_rows: Option<Vec<SeqRecord>>,
    consensus: SeqRecord,
    consensus_sketch: Sketch,
    consensus_minimizers: MinimizerHits,
    phase: Phase,
}

impl RefMsaOrchestrator {
    /// Build the reference index and choose the center (`Constructed ->
    /// Indexed`).
    ///
    /// Without a center file the reference pool is the `cons_n` longest
    /// input records. With `keep_first_length` the center is the first
    /// reference verbatim; otherwise the pool is aligned by the external
    /// tool and reduced to a column-majority consensus.
    pub fn new(
        mut opts: MsaOpt,
        tool: Box<dyn MsaTool>,
        input: &Path,
        workdir: Option<&Path>,
        center: Option<&Path>,
    ) -> Result<Self> {
        opts.validate()?;

        let workdir = Workdir::prepare(workdir)?;
        workdir.stage_input(input)?;

        let refs = match center {
            Some(path) => {
                log::info!("reference pool from center file: {}", path.display());
                FastaReader::open(path)?.read_all()?
            }
            None => {
                let mut selector = TopKLongestSelector::new(opts.cons_n);
                let mut reader = FastaReader::open(input)?;
                while let Some(rec) = reader.next_record()? {
                    selector.consider(rec);
                }
                selector.take_sorted_desc()
            }
        };
        if refs.is_empty() {
            return Err(MsaError::invalid("no reference sequences available"));
        }
        log::info!(
            "indexed {} reference(s), longest {} bp",
            refs.len(),
            refs.iter().map(|r| r.len()).max().unwrap_or(0)
        );

        let pool_path = workdir.clean_dir().join("references.fasta");
        let mut pool_writer = FastaWriter::create(&pool_path, opts.line_width)?;
        for r in &refs {
            pool_writer.write(r)?;
        }
        pool_writer.flush()?;

        let ref_sketches: Vec<Sketch> = refs
            .iter()
            .map(|r| {
                sketch(
                    &r.seq,
                    opts.kmer_size,
                    opts.sketch_size,
                    opts.noncanonical,
                    opts.sketch_seed,
                )
            })
            .collect();
        let ref_minimizers: Vec<MinimizerHits> = refs
            .iter()
            .enumerate()
            .map(|(rid, r)| {
                extract_with_rid(
                    &r.seq,
                    opts.kmer_size,
                    opts.kmer_window,
                    opts.noncanonical,
                    rid as u32,
                )
            })
            .collect();

        let (ref_msa_rows, consensus) = if refs.len() == 1 {
            (None, refs[0].clone())
        } else {
            let aligned_path = workdir.clean_dir().join("references_aligned.fasta");
            tool.align(&pool_path, &aligned_path, opts.threads)?;
            let rows = FastaReader::open(&aligned_path)?.read_all()?;
            validate_msa_rows(&rows, &refs, &aligned_path)?;

            if opts.keep_first_length {
                (Some(rows), refs[0].clone())
            } else {
                let (seq, counts) = column_consensus(&rows, 0, opts.threads, 4096)?;
                write_counts_json(workdir.clean_dir().join("consensus.json"), &counts)?;
                let consensus = SeqRecord::new("consensus", seq);
                (Some(rows), consensus)
            }
        };

        let mut consensus_writer =
            FastaWriter::create(workdir.clean_dir().join("consensus.fasta"), opts.line_width)?;
        consensus_writer.write(&consensus)?;
        consensus_writer.flush()?;
        log::info!(
            "center '{}' ({} bp), backend {}",
            consensus.id,
            consensus.len(),
            opts.backend
        );

        let consensus_sketch = sketch(
            &consensus.seq,
            opts.kmer_size,
            opts.sketch_size,
            opts.noncanonical,
            opts.sketch_seed,
        );
        let consensus_minimizers = extract(
            &consensus.seq,
            opts.kmer_size,
            opts.kmer_window,
            opts.noncanonical,
        );

        Ok(RefMsaOrchestrator {
            opts,
            workdir,
            tool,
            refs,
            ref_sketches,
            ref_minimizers,
            ref_msa_rows,
            consensus,
            consensus_sketch,
            consensus_minimizers,
            phase: Phase::Indexed,
        })
    }

    pub fn workdir_root(&self) -> &Path {
        self.workdir.root()
    }

    pub fn consensus(&self) -> &SeqRecord {
        &self.consensus
    }

    fn plain_sam_path(&self, tid: usize) -> PathBuf {
        self.workdir.results_dir().join(format!("aligned_{}.sam", tid))
    }

    fn insertion_sam_path(&self, tid: usize) -> PathBuf {
        self.workdir
            .results_dir()
            .join(format!("aligned_insertion_{}.sam", tid))
    }

    /// Pairwise alignment of one query against a target from the index.
    fn pairwise(&self, target_seq: &[u8], target_hits: &[crate::minimizer::MinimizerHit], q: &SeqRecord) -> Cigar {
        match self.opts.backend {
            AlignBackend::AnchorSegmented => {
                let qry_hits = extract(
                    &q.seq,
                    self.opts.kmer_size,
                    self.opts.kmer_window,
                    self.opts.noncanonical,
                );
                let anchors =
                    collect_anchors(target_hits, &qry_hits, &SeedFilterParams::default());
                global_align_segmented(target_seq, &q.seq, anchors)
            }
            backend => align(backend, target_seq, &q.seq),
        }
    }

    /// Process one query: pick the closest reference by Jaccard, align, and
    /// route the record through the two-pass insertion protocol. Returns
    /// whether the record went to the insertion stream.
    fn align_one(
        &self,
        q: &SeqRecord,
        plain: &mut SamWriter,
        insertion: &mut SamWriter,
    ) -> Result<bool> {
        let q_sketch = sketch(
            &q.seq,
            self.opts.kmer_size,
            self.opts.sketch_size,
            self.opts.noncanonical,
            self.opts.sketch_seed,
        );

        let mut best = 0usize;
        let mut best_j = f64::NEG_INFINITY;
        for (idx, ref_sketch) in self.ref_sketches.iter().enumerate() {
            let j = jaccard(&q_sketch, ref_sketch)?;
            if j > best_j {
                best_j = j;
                best = idx;
            }
        }

        let cigar1 = self.pairwise(&self.refs[best].seq, &self.ref_minimizers[best], q);
        if !has_insertion(&cigar1) {
            plain.write_record(&q.id, &self.refs[best].id, &cigar1)?;
            return Ok(false);
        }

        // Second pass: re-align against the center; the insertion may be
        // explained by the consensus columns.
        if log::log_enabled!(log::Level::Debug) {
            let j = jaccard(&q_sketch, &self.consensus_sketch)?;
            log::debug!(
                "query '{}': insertion vs '{}' (j={:.4}), re-aligning against '{}' (j={:.4})",
                q.id,
                self.refs[best].id,
                best_j,
                self.consensus.id,
                j
            );
        }
        let cigar2 = self.pairwise(&self.consensus.seq, &self.consensus_minimizers, q);
        let final_cigar = if cigar2.is_empty() { cigar1 } else { cigar2 };

        if has_insertion(&final_cigar) {
            insertion.write_record(&q.id, &self.consensus.id, &final_cigar)?;
            Ok(true)
        } else {
            plain.write_record(&q.id, &self.consensus.id, &final_cigar)?;
            Ok(false)
        }
    }

    /// Stream the query FASTA through the worker pool (`Indexed ->
    /// AlignDone`).
    pub fn align_queries(&mut self, query_path: &Path) -> Result<MsaStats> {
        if self.phase != Phase::Indexed {
            return Err(MsaError::invalid("align_queries: pipeline is not in the indexed phase"));
        }

        let timer = Instant::now();
        let t = self.opts.threads;
        let batch_size = self.opts.batch_size;

        let mut writers = Vec::with_capacity(t);
        for tid in 0..t {
            let plain = SamWriter::create(self.plain_sam_path(tid))?;
            let insertion = SamWriter::create(self.insertion_sam_path(tid))?;
            writers.push((plain, insertion));
        }

        let this = &*self;
        let mut stats = MsaStats::default();

        let outcomes: Vec<Result<WorkerOutcome>> = std::thread::scope(|scope| {
            let (ack_tx, ack_rx) = unbounded::<()>();
            let mut senders: Vec<Sender<WorkItem>> = Vec::with_capacity(t);
            let mut handles = Vec::with_capacity(t);

            for (plain, insertion) in writers.drain(..) {
                let (tx, rx) = unbounded::<WorkItem>();
                senders.push(tx);
                let ack = ack_tx.clone();
                handles.push(
                    scope.spawn(move || worker_loop(this, rx, plain, insertion, ack)),
                );
            }
            drop(ack_tx);

            let producer: Result<usize> = (|| {
                let mut reader = FastaReader::open(query_path)?;
                let mut batches = 0usize;
                loop {
                    let batch = reader.read_batch(batch_size)?;
                    if batch.is_empty() {
                        break;
                    }
                    let n = batch.len();
                    for (i, rec) in batch.into_iter().enumerate() {
                        if senders[i % t].send(WorkItem::Query(rec)).is_err() {
                            return Err(MsaError::invalid(
                                "worker terminated unexpectedly during dispatch",
                            ));
                        }
                    }
                    // Fork-join barrier: every writer flushes before the
                    // next chunk is read.
                    for s in &senders {
                        let _ = s.send(WorkItem::Flush);
                    }
                    for _ in 0..t {
                        if ack_rx.recv().is_err() {
                            return Err(MsaError::invalid(
                                "worker terminated unexpectedly at batch barrier",
                            ));
                        }
                    }
                    batches += 1;
                    log::info!("batch {}: dispatched {} queries", batches, n);
                }
                Ok(batches)
            })();

            drop(senders);
            let outcomes: Vec<Result<WorkerOutcome>> = handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(res) => res,
                    Err(_) => Err(MsaError::invalid("worker thread panicked")),
                })
                .collect();

            match producer {
                Ok(batches) => stats.batches = batches,
                Err(e) => return vec![Err(e)],
            }
            outcomes
        });

        for outcome in outcomes {
            let o = outcome?;
            stats.total_queries += o.processed;
            stats.insertion_queries += o.insertions;
        }

        stats.wall_secs = timer.elapsed().as_secs_f64();
        log::info!("{}", stats);
        self.phase = Phase::AlignDone;
        Ok(stats)
    }

    /// Merge every per-worker stream into the final MSA (`AlignDone ->
    /// Merged`).
    ///
    /// The SAM intermediates carry `seq=*`, so query sequences are re-read
    /// from the input FASTA and joined by qname.
    pub fn merge(&mut self, query_path: &Path, output: &Path) -> Result<()> {
        if self.phase != Phase::AlignDone {
            return Err(MsaError::invalid("merge: pipeline is not in the align-done phase"));
        }
        let t = self.opts.threads;

        let mut qmap: HashMap<String, Vec<u8>> = HashMap::new();
        let mut reader = FastaReader::open(query_path)?;
        while let Some(rec) = reader.next_record()? {
            if qmap.insert(rec.id.clone(), rec.seq).is_some() {
                log::warn!("duplicate query id '{}', keeping the last", rec.id);
            }
        }

        let plain_records: Vec<Vec<SamRecord>> = (0..t)
            .map(|tid| read_sam_file(self.plain_sam_path(tid)))
            .collect::<Result<_>>()?;
        let insertion_records: Vec<Vec<SamRecord>> = (0..t)
            .map(|tid| read_sam_file(self.insertion_sam_path(tid)))
            .collect::<Result<_>>()?;
        let n_insertions: usize = insertion_records.iter().map(|v| v.len()).sum();

        // Insertion-pool MSA: the center plus every insertion-carrying
        // query, aligned externally; its center row defines which merged
        // columns are insertions.
        let mut pool_rows: HashMap<String, Cigar> = HashMap::new();
        let center_to_pool = if n_insertions == 0 {
            identity_cigar(self.consensus.len())
        } else {
            let pool_path = self.workdir.results_dir().join("insertion_pool.fasta");
            let msa_path = self.workdir.results_dir().join("reference_msa.fasta");

            let mut w = FastaWriter::create(&pool_path, self.opts.line_width)?;
            w.write(&self.consensus)?;
            for per_worker in &insertion_records {
                for rec in per_worker {
                    let seq = qmap.get(&rec.qname).ok_or_else(|| {
                        MsaError::parse(format!("insertion query '{}' not in input", rec.qname))
                    })?;
                    w.write_parts(&rec.qname, None, seq)?;
                }
            }
            w.flush()?;

            self.tool.align(&pool_path, &msa_path, self.opts.threads)?;
            let rows = FastaReader::open(&msa_path)?.read_all()?;
            let width = rows.first().map(|r| r.len()).unwrap_or(0);
            let mut center_row = None;
            for row in rows {
                if row.len() != width {
                    return Err(MsaError::parse(format!(
                        "{}: ragged row '{}'",
                        msa_path.display(),
                        row.id
                    )));
                }
                let md = row_to_md_cigar(&row.seq);
                if row.id == self.consensus.id && center_row.is_none() {
                    center_row = Some(md);
                } else {
                    pool_rows.insert(row.id, md);
                }
            }
            let center_row = center_row.ok_or_else(|| {
                MsaError::parse(format!(
                    "{}: no row for center '{}'",
                    msa_path.display(),
                    self.consensus.id
                ))
            })?;
            if cigar::qry_length(&center_row) != self.consensus.len() {
                return Err(MsaError::AlignmentInconsistency {
                    context: format!(
                        "insertion-pool row for '{}' spans {} bases, center has {}",
                        self.consensus.id,
                        cigar::qry_length(&center_row),
                        self.consensus.len()
                    ),
                });
            }
            center_row
        };

        // Center -> aligned-reference columns.
        let center_to_c1 = self.c1_row(&self.consensus.id)?;
        let (c1_to_final, pool_to_final) = union_spaces(&center_to_c1, &center_to_pool)?;
        let final_width = ref_length(&c1_to_final);

        // Center row in the final layout.
        let center_final = compose_with_msa(&center_to_c1, &c1_to_final)?;
        let mut center_row = self.consensus.seq.clone();
        pad_query_to_ref(&mut center_row, &center_final);

        // Column-trimming mask.
        let mut keep = vec![true; final_width];
        if self.opts.keep_first_length {
            for (slot, &b) in keep.iter_mut().zip(&center_row) {
                if b == b'-' {
                    *slot = false;
                }
            }
        }
        if self.opts.keep_all_length {
            for r in &self.refs {
                let lifted = compose_with_msa(&self.c1_row(&r.id)?, &c1_to_final)?;
                let mut row = r.seq.clone();
                pad_query_to_ref(&mut row, &lifted);
                for (slot, &b) in keep.iter_mut().zip(&row) {
                    if b == b'-' {
                        *slot = false;
                    }
                }
            }
        }

        let mut out = FastaWriter::create(output, self.opts.line_width)?;
        out.write_parts(
            &self.consensus.id,
            self.consensus.desc.as_deref(),
            &apply_column_mask(&center_row, &keep),
        )?;

        let mut rows_written = 1usize;
        for tid in 0..t {
            for rec in &plain_records[tid] {
                let seq = qmap.get(&rec.qname).ok_or_else(|| {
                    MsaError::parse(format!("query '{}' not in input", rec.qname))
                })?;
                let lifted = compose_with_msa(&rec.cigar, &self.c1_row(&rec.rname)?)?;
                let final_cigar = compose_with_msa(&lifted, &c1_to_final)?;
                self.write_row(&mut out, &rec.qname, seq, &final_cigar, final_width, &keep)?;
                rows_written += 1;
            }
            for rec in &insertion_records[tid] {
                let seq = qmap.get(&rec.qname).ok_or_else(|| {
                    MsaError::parse(format!("query '{}' not in input", rec.qname))
                })?;
                let pool_row = pool_rows.get(&rec.qname).ok_or_else(|| {
                    MsaError::parse(format!(
                        "insertion query '{}' missing from the reference MSA",
                        rec.qname
                    ))
                })?;
                let final_cigar = compose_with_msa(pool_row, &pool_to_final)?;
                self.write_row(&mut out, &rec.qname, seq, &final_cigar, final_width, &keep)?;
                rows_written += 1;
            }
        }
        out.flush()?;

        log::info!(
            "merged {} rows into {} ({} columns kept of {})",
            rows_written,
            output.display(),
            keep.iter().filter(|&&k| k).count(),
            final_width
        );
        self.phase = Phase::Merged;
        Ok(())
    }

    fn write_row(
        &self,
        out: &mut FastaWriter,
        id: &str,
        seq: &[u8],
        final_cigar: &Cigar,
        final_width: usize,
        keep: &[bool],
    ) -> Result<()> {
        let mut row = seq.to_vec();
        if row.is_empty() {
            row = vec![b'-'; final_width];
        } else {
            pad_query_to_ref(&mut row, final_cigar);
        }
        if row.len() != final_width {
            return Err(MsaError::AlignmentInconsistency {
                context: format!(
                    "row '{}' spans {} columns, expected {}",
                    id,
                    row.len(),
                    final_width
                ),
            });
        }
        out.write_parts(id, None, &apply_column_mask(&row, keep))
    }

    /// M/D CIGAR lifting a reference (or the center) into the
    /// aligned-reference column space.
    fn c1_row(&self, id: &str) -> Result<Cigar> {
        if let Some(rows) = &self.ref_msa_rows {
            if let Some(row) = rows.iter().find(|r| r.id == id) {
                return Ok(row_to_md_cigar(&row.seq));
            }
            if id == self.consensus.id {
                // A synthetic consensus spans every aligned column.
                return Ok(identity_cigar(self.consensus.len()));
            }
            Err(MsaError::parse(format!(
                "rname '{}' has no aligned-reference row",
                id
            )))
        } else {
            if id == self.refs[0].id || id == self.consensus.id {
                return Ok(identity_cigar(self.refs[0].len()));
            }
            Err(MsaError::parse(format!("unknown rname '{}'", id)))
        }
    }

    /// Release the working directory (honors `--save-workdir`).
    pub fn finish(self) {
        self.workdir.finish(self.opts.save_workdir);
    }
}

/// Validate the externally aligned reference rows against the pool.
fn validate_msa_rows(rows: &[SeqRecord], refs: &[SeqRecord], path: &Path) -> Result<()> {
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    for row in rows {
        if row.len() != width {
            return Err(MsaError::parse(format!(
                "{}: ragged row '{}' ({} columns, expected {})",
                path.display(),
                row.id,
                row.len(),
                width
            )));
        }
    }
    for r in refs {
        let Some(row) = rows.iter().find(|row| row.id == r.id) else {
            return Err(MsaError::parse(format!(
                "{}: no aligned row for reference '{}'",
                path.display(),
                r.id
            )));
        };
        let ungapped: Vec<u8> = row.seq.iter().copied().filter(|&b| b != b'-').collect();
        if ungapped != r.seq {
            return Err(MsaError::AlignmentInconsistency {
                context: format!(
                    "{}: aligned row for '{}' does not restore the reference",
                    path.display(),
                    r.id
                ),
            });
        }
    }
    Ok(())
}

fn worker_loop(
    ctx: &RefMsaOrchestrator,
    rx: Receiver<WorkItem>,
    mut plain: SamWriter,
    mut insertion: SamWriter,
    ack: Sender<()>,
) -> Result<WorkerOutcome> {
    let mut outcome = WorkerOutcome::default();
    let mut failed: Option<MsaError> = None;

    while let Ok(item) = rx.recv() {
        match item {
            WorkItem::Query(q) => {
                // After a failure the worker keeps draining (and acking) so
                // the producer's barrier never stalls; the error surfaces at
                // join time.
                if failed.is_none() {
                    match ctx.align_one(&q, &mut plain, &mut insertion) {
                        Ok(went_to_insertion) => {
                            outcome.processed += 1;
                            if went_to_insertion {
                                outcome.insertions += 1;
                            }
                        }
                        Err(e) => {
                            log::error!("worker failed on query '{}': {}", q.id, e);
                            failed = Some(e);
                        }
                    }
                }
            }
            WorkItem::Flush => {
                if failed.is_none() {
                    if let Err(e) = plain.flush().and_then(|_| insertion.flush()) {
                        failed = Some(e);
                    }
                }
                let _ = ack.send(());
            }
        }
    }

    match failed {
        Some(e) => Err(e),
        None => {
            plain.flush()?;
            insertion.flush()?;
            Ok(outcome)
        }
    }
}

/// Run the whole pipeline: index, align, merge, clean up.
pub fn run_pipeline(
    opts: MsaOpt,
    tool: Box<dyn MsaTool>,
    input: &Path,
    output: &Path,
    workdir: Option<&Path>,
    center: Option<&Path>,
) -> Result<MsaStats> {
    let mut orch = RefMsaOrchestrator::new(opts, tool, input, workdir, center)?;
    let stats = orch.align_queries(input)?;
    orch.merge(input, output)?;
    orch.finish();
    Ok(stats)
}
