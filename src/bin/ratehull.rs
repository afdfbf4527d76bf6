use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "ratehull", version)]
struct Cli {
    /// More logging (repeat for trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the target rate sequence for a source bitrate.
    Rates(RatesArgs),
    /// Probe and walk a single source (requires `ffmpeg` with libvmaf and `ffprobe` on PATH).
    Walk(WalkArgs),
    /// Walk every source listed in a file, writing `<stem>_convex_hull.json` beside each.
    Batch(BatchArgs),
}

#[derive(Parser, Debug)]
struct RatesArgs {
    /// Source bitrate in kbps.
    #[arg(long)]
    source_kbps: u32,

    /// Walk configuration JSON.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct WalkArgs {
    /// Source video.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output hull JSON (defaults to `<stem>_convex_hull.json` beside the source).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Walk configuration JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Abort the walk after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Write the partial hull when the walk fails part way.
    #[arg(long, default_value_t = false)]
    keep_partial: bool,
}

#[derive(Parser, Debug)]
struct BatchArgs {
    /// File listing one source path per line.
    #[arg(long)]
    list: PathBuf,

    /// Directory relative list entries resolve against.
    #[arg(long)]
    base: Option<PathBuf>,

    /// Concurrent walks.
    #[arg(long)]
    jobs: Option<usize>,

    /// Walk configuration JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Re-walk sources whose hull JSON already exists.
    #[arg(long, default_value_t = false)]
    no_skip_existing: bool,

    /// Skip sources taller than this many pixels.
    #[arg(long, default_value_t = 1080)]
    max_height: u32,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    match cli.cmd {
        Command::Rates(args) => cmd_rates(args),
        Command::Walk(args) => cmd_walk(args),
        Command::Batch(args) => cmd_batch(args),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => tracing::Level::WARN,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ratehull::WalkConfig> {
    match path {
        Some(p) => ratehull::WalkConfig::from_path(p)
            .with_context(|| format!("load config '{}'", p.display())),
        None => Ok(ratehull::WalkConfig::default()),
    }
}

fn make_walker(
    config: ratehull::WalkConfig,
) -> anyhow::Result<ratehull::HullWalker<ratehull::FfmpegBackend>> {
    if !ratehull::is_libvmaf_available() {
        anyhow::bail!("ffmpeg on PATH was built without the libvmaf filter");
    }
    let backend = ratehull::FfmpegBackend::new(ratehull::FfmpegBackendOpts::default())?;
    Ok(ratehull::HullWalker::new(config, backend)?)
}

fn cmd_rates(args: RatesArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let rates = config.rates.generate(args.source_kbps)?;
    for r in rates {
        println!("{r}");
    }
    Ok(())
}

fn cmd_walk(args: WalkArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let walker = make_walker(config)?;
    let source = ratehull::probe_source(&args.in_path)
        .with_context(|| format!("probe '{}'", args.in_path.display()))?;
    eprintln!(
        "source {}: {} @ {} kbps",
        args.in_path.display(),
        source.resolution,
        source.bitrate_kbps
    );

    let cancel = match args.timeout_secs {
        Some(s) => ratehull::CancelToken::with_timeout(Duration::from_secs(s)),
        None => ratehull::CancelToken::new(),
    };
    let out = args
        .out
        .unwrap_or_else(|| ratehull::hull_output_path(&args.in_path));

    match walker.walk(&source, &cancel) {
        Ok(hull) => {
            ratehull::write_hull_json(&out, &hull)?;
            eprintln!("wrote {} ({} points)", out.display(), hull.len());
            Ok(())
        }
        Err(failure) => {
            if args.keep_partial && !failure.partial.is_empty() {
                ratehull::write_hull_json(&out, &failure.partial)?;
                eprintln!(
                    "wrote partial hull {} ({} points)",
                    out.display(),
                    failure.partial.len()
                );
            }
            Err(failure.into())
        }
    }
}

fn cmd_batch(args: BatchArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let walker = make_walker(config)?;
    let sources = ratehull::read_source_list(&args.list, args.base.as_deref())?;
    let opts = ratehull::BatchOpts {
        threads: args.jobs,
        skip_existing: !args.no_skip_existing,
        max_source_height: Some(args.max_height),
    };

    let reports = ratehull::run_batch(
        &walker,
        &ratehull::FfprobeProber,
        &sources,
        &opts,
        &ratehull::CancelToken::new(),
    )?;
    for r in &reports {
        match &r.outcome {
            ratehull::AssetOutcome::Written { output, points } => {
                eprintln!("  {}: wrote {} ({points} points)", r.source.display(), output.display());
            }
            ratehull::AssetOutcome::SkippedExisting { output } => {
                eprintln!("  {}: skipped, {} exists", r.source.display(), output.display());
            }
            ratehull::AssetOutcome::SkippedTooTall {
                resolution,
                max_height,
            } => {
                eprintln!(
                    "  {}: skipped, {resolution} is taller than {max_height}",
                    r.source.display()
                );
            }
            ratehull::AssetOutcome::ProbeFailed(e) | ratehull::AssetOutcome::WriteFailed(e) => {
                eprintln!("  {}: failed: {e}", r.source.display());
            }
            ratehull::AssetOutcome::WalkFailed(f) => {
                eprintln!("  {}: failed: {f}", r.source.display());
            }
        }
    }

    let summary = ratehull::BatchSummary::from_reports(&reports);
    eprintln!(
        "{} written, {} skipped, {} failed",
        summary.written, summary.skipped, summary.failed
    );
    if summary.failed > 0 {
        anyhow::bail!("{} of {} sources failed", summary.failed, reports.len());
    }
    Ok(())
}
