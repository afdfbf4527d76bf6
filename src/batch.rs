use std::path::{Path, PathBuf};

use anyhow::Context as _;
use rayon::prelude::*;

use crate::{
    backend::QualityBackend,
    cancel::CancelToken,
    foundation::{
        core::Resolution,
        error::{HullError, HullResult},
    },
    hull::{hull_output_path, write_hull_json},
    probe::SourceProber,
    walk::{HullWalker, WalkFailure},
};

#[derive(Clone, Debug)]
pub struct BatchOpts {
    /// Concurrent walks; `None` lets rayon pick.
    pub threads: Option<usize>,
    /// Leave sources alone whose hull JSON already exists.
    pub skip_existing: bool,
    /// Skip sources taller than this.
    pub max_source_height: Option<u32>,
}

impl Default for BatchOpts {
    fn default() -> Self {
        Self {
            threads: None,
            skip_existing: true,
            max_source_height: Some(1080),
        }
    }
}

#[derive(Debug)]
pub enum AssetOutcome {
    Written { output: PathBuf, points: usize },
    SkippedExisting { output: PathBuf },
    SkippedTooTall { resolution: Resolution, max_height: u32 },
    ProbeFailed(HullError),
    WalkFailed(WalkFailure),
    WriteFailed(HullError),
}

impl AssetOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ProbeFailed(_) | Self::WalkFailed(_) | Self::WriteFailed(_)
        )
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::SkippedExisting { .. } | Self::SkippedTooTall { .. })
    }
}

#[derive(Debug)]
pub struct AssetReport {
    pub source: PathBuf,
    pub outcome: AssetOutcome,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_reports(reports: &[AssetReport]) -> Self {
        let mut s = Self::default();
        for r in reports {
            if r.outcome.is_failure() {
                s.failed += 1;
            } else if r.outcome.is_skipped() {
                s.skipped += 1;
            } else {
                s.written += 1;
            }
        }
        s
    }
}

/// Source paths listed one per line in `list_path`.
///
/// Blank lines and `#` comments are ignored; relative entries resolve against `base`.
pub fn read_source_list(list_path: &Path, base: Option<&Path>) -> HullResult<Vec<PathBuf>> {
    let text = std::fs::read_to_string(list_path)
        .with_context(|| format!("failed to read source list '{}'", list_path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| match base {
            Some(b) if Path::new(l).is_relative() => b.join(l),
            _ => PathBuf::from(l),
        })
        .collect())
}

/// Walk every source on a bounded pool, writing `<stem>_convex_hull.json` beside each.
///
/// Assets are independent: one failing never stops or alters another. Reports come back in
/// input order.
pub fn run_batch<B: QualityBackend, P: SourceProber>(
    walker: &HullWalker<B>,
    prober: &P,
    sources: &[PathBuf],
    opts: &BatchOpts,
    cancel: &CancelToken,
) -> HullResult<Vec<AssetReport>> {
    let pool = build_thread_pool(opts.threads)?;
    let reports = pool.install(|| {
        sources
            .par_iter()
            .map(|source| AssetReport {
                source: source.clone(),
                outcome: process_asset(walker, prober, source, opts, cancel),
            })
            .collect::<Vec<_>>()
    });

    let summary = BatchSummary::from_reports(&reports);
    tracing::info!(
        written = summary.written,
        skipped = summary.skipped,
        failed = summary.failed,
        "batch finished"
    );
    Ok(reports)
}

#[tracing::instrument(skip(walker, prober, opts, cancel))]
fn process_asset<B: QualityBackend, P: SourceProber>(
    walker: &HullWalker<B>,
    prober: &P,
    source: &Path,
    opts: &BatchOpts,
    cancel: &CancelToken,
) -> AssetOutcome {
    let output = hull_output_path(source);
    if opts.skip_existing && output.exists() {
        tracing::info!(output = %output.display(), "hull already exists; skipping");
        return AssetOutcome::SkippedExisting { output };
    }

    let asset = match prober.probe(source) {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, "probe failed");
            return AssetOutcome::ProbeFailed(e);
        }
    };
    if let Some(max_height) = opts.max_source_height
        && asset.resolution.height > max_height
    {
        tracing::info!(resolution = %asset.resolution, max_height, "source too tall; skipping");
        return AssetOutcome::SkippedTooTall {
            resolution: asset.resolution,
            max_height,
        };
    }

    let hull = match walker.walk(&asset, cancel) {
        Ok(h) => h,
        Err(failure) => {
            tracing::warn!(
                partial_points = failure.partial.len(),
                error = %failure,
                "walk failed; nothing written"
            );
            return AssetOutcome::WalkFailed(failure);
        }
    };

    match write_hull_json(&output, &hull) {
        Ok(()) => {
            tracing::info!(output = %output.display(), points = hull.len(), "wrote hull");
            AssetOutcome::Written {
                output,
                points: hull.len(),
            }
        }
        Err(e) => AssetOutcome::WriteFailed(e),
    }
}

fn build_thread_pool(threads: Option<usize>) -> HullResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(HullError::validation(
            "batch 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("ratehull-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| HullError::Other(anyhow::anyhow!("failed to build rayon thread pool: {e}")))
}
