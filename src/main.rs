use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use starmsa::alignment::AlignBackend;
use starmsa::external::CommandMsaTool;
use starmsa::opts::MsaOpt;
use starmsa::pipeline::run_pipeline;

#[derive(Parser)]
#[command(name = "starmsa")]
#[command(about = "Reference-guided multiple sequence alignment for highly similar nucleotide sequences", long_about = None)]
#[command(version)]
struct Cli {
    /// Input FASTA (plain or gzip)
    #[arg(short = 'i', long, value_name = "FASTA")]
    input: PathBuf,

    /// Output aligned FASTA
    #[arg(short = 'o', long, value_name = "FASTA")]
    output: PathBuf,

    /// Working directory (auto-generated if absent)
    #[arg(short = 'w', long, value_name = "DIR")]
    workdir: Option<PathBuf>,

    /// Number of worker threads (default: hardware concurrency)
    #[arg(short = 't', long, value_name = "INT")]
    threads: Option<usize>,

    /// K-mer size for sketching and minimizers
    #[arg(long, value_name = "INT", default_value = "15")]
    kmer_size: usize,

    /// Minimizer window, in k-mers
    #[arg(long, value_name = "INT", default_value = "10")]
    kmer_window: usize,

    /// Number of longest sequences used to build the consensus
    #[arg(long, value_name = "INT", default_value = "1000")]
    cons_n: usize,

    /// MinHash sketch size
    #[arg(long, value_name = "INT", default_value = "2000")]
    sketch_size: usize,

    /// Center FASTA overriding the consensus-pool selection
    #[arg(short = 'c', long, value_name = "FASTA")]
    center: Option<PathBuf>,

    /// MSA package: minipoa, mafft, clustalo, or a command template with
    /// {input} and {output} (optional {thread})
    #[arg(short = 'p', long, value_name = "PKG", default_value = "mafft")]
    package: String,

    /// Trim merged columns where the first reference is gapped
    #[arg(long)]
    keep_first_length: bool,

    /// Additionally trim columns where any reference is gapped
    #[arg(long)]
    keep_all_length: bool,

    /// Keep the auto-generated working directory after the run
    #[arg(long)]
    save_workdir: bool,

    /// Pairwise aligner back-end: wavefront, banded-dp, anchor-segmented
    #[arg(long, value_name = "NAME", default_value = "wavefront")]
    backend: String,
}

fn parse_backend(name: &str) -> Option<AlignBackend> {
    match name {
        "wavefront" => Some(AlignBackend::Wavefront),
        "banded-dp" => Some(AlignBackend::BandedDp),
        "anchor-segmented" => Some(AlignBackend::AnchorSegmented),
        _ => None,
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    if !cli.input.exists() {
        log::error!("input file does not exist: {}", cli.input.display());
        return ExitCode::FAILURE;
    }

    let Some(backend) = parse_backend(&cli.backend) else {
        log::error!("unknown backend '{}'", cli.backend);
        return ExitCode::FAILURE;
    };

    let tool = match CommandMsaTool::from_spec(&cli.package) {
        Ok(tool) => tool,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut opts = MsaOpt {
        kmer_size: cli.kmer_size,
        kmer_window: cli.kmer_window,
        sketch_size: cli.sketch_size,
        cons_n: cli.cons_n,
        keep_first_length: cli.keep_first_length,
        keep_all_length: cli.keep_all_length,
        save_workdir: cli.save_workdir,
        backend,
        ..MsaOpt::default()
    };
    if let Some(threads) = cli.threads {
        opts.threads = threads;
    }
    if let Err(e) = opts.validate() {
        log::error!("{}", e);
        return ExitCode::FAILURE;
    }

    match run_pipeline(
        opts,
        Box::new(tool),
        &cli.input,
        &cli.output,
        cli.workdir.as_deref(),
        cli.center.as_deref(),
    ) {
        Ok(stats) => {
            log::info!("done: {}", stats);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
