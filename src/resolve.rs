use std::path::Path;

use crate::{
    backend::{EncodeJob, EncodedArtifact, QualityBackend, ScoreJob},
    cancel::CancelToken,
    foundation::{
        core::{Resolution, SourceAsset},
        error::{HullError, HullResult},
    },
    hull::HullPoint,
    ladder::ResolutionLadder,
    scratch::ScratchDir,
};

/// Picks the better of "stay at the current resolution" and "step one rung down" for a single
/// target rate.
///
/// Each call owns a fresh [`ScratchDir`]; encodes and score logs never outlive the call.
pub struct RatePointResolver<'a> {
    ladder: &'a ResolutionLadder,
    backend: &'a dyn QualityBackend,
    scratch_root: &'a Path,
}

impl<'a> RatePointResolver<'a> {
    pub fn new(
        ladder: &'a ResolutionLadder,
        backend: &'a dyn QualityBackend,
        scratch_root: &'a Path,
    ) -> Self {
        Self {
            ladder,
            backend,
            scratch_root,
        }
    }

    /// Resolve the hull point at `rate_kbps`, starting from `candidate`.
    ///
    /// 1. No rung below `candidate`: accept it unmeasured ([`Quality::LadderFloor`]).
    /// 2. Encode `candidate` and the next rung concurrently; either failure fails the point.
    /// 3. Score both against the source at `reference_resolution` concurrently; a failure or an
    ///    out-of-range score fails the point.
    /// 4. `candidate` wins only on a strictly higher score. Ties go to the lower rung.
    ///
    /// [`Quality::LadderFloor`]: crate::Quality::LadderFloor
    #[tracing::instrument(
        skip(self, source, candidate, cancel),
        fields(source = %source.path.display(), candidate = %candidate)
    )]
    pub fn resolve(
        &self,
        source: &SourceAsset,
        reference_resolution: Resolution,
        rate_kbps: u32,
        candidate: Resolution,
        cancel: &CancelToken,
    ) -> HullResult<HullPoint> {
        cancel.check("resolve")?;

        let Some(lower) = self.ladder.next_lower(candidate) else {
            tracing::debug!("no lower rung; accepting candidate unmeasured");
            return Ok(HullPoint::ladder_floor(candidate, rate_kbps));
        };

        let scratch = ScratchDir::create(self.scratch_root, &source.stem())?;
        let upper_job = EncodeJob {
            source,
            resolution: candidate,
            rate_kbps,
            out_path: scratch.join(artifact_name(source, candidate, rate_kbps)),
        };
        let lower_job = EncodeJob {
            source,
            resolution: lower,
            rate_kbps,
            out_path: scratch.join(artifact_name(source, lower, rate_kbps)),
        };

        let (upper_art, lower_art) = fork_join(
            || self.backend.encode(&upper_job, cancel),
            || self.backend.encode(&lower_job, cancel),
        );
        let upper_art = upper_art?;
        let lower_art = lower_art?;
        cancel.check("encode")?;

        let upper_score_job = score_job(source, reference_resolution, &upper_art);
        let lower_score_job = score_job(source, reference_resolution, &lower_art);
        let (upper_score, lower_score) = fork_join(
            || self.backend.score(&upper_score_job, cancel),
            || self.backend.score(&lower_score_job, cancel),
        );
        let upper_score = checked_score(upper_score?, candidate, rate_kbps)?;
        let lower_score = checked_score(lower_score?, lower, rate_kbps)?;
        cancel.check("score")?;

        tracing::debug!(
            upper = %candidate,
            upper_score,
            lower = %lower,
            lower_score,
            "scored rate point"
        );

        let point = if upper_score > lower_score {
            HullPoint::measured(candidate, rate_kbps, upper_score)
        } else {
            HullPoint::measured(lower, rate_kbps, lower_score)
        };
        drop(scratch);
        Ok(point)
    }
}

/// Run `a` on a scoped thread and `b` on the current one; wait for both.
///
/// Backend calls block on child processes, so they get a real thread rather than a pool task
/// that might be serialized behind other blocked work.
fn fork_join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB,
    RA: Send,
{
    std::thread::scope(|scope| {
        let handle = scope.spawn(a);
        let rb = b();
        match handle.join() {
            Ok(ra) => (ra, rb),
            Err(payload) => std::panic::resume_unwind(payload),
        }
    })
}

fn score_job<'s>(
    source: &'s SourceAsset,
    reference_resolution: Resolution,
    artifact: &'s EncodedArtifact,
) -> ScoreJob<'s> {
    let mut log_name = artifact
        .path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "candidate".into());
    log_name.push(".json");
    ScoreJob {
        reference: source,
        reference_resolution,
        artifact,
        log_path: artifact.path.with_file_name(log_name),
    }
}

fn checked_score(score: f64, resolution: Resolution, rate_kbps: u32) -> HullResult<f64> {
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(HullError::score(
            resolution,
            rate_kbps,
            format!("quality score {score} is outside [0, 100]"),
        ));
    }
    Ok(score)
}

/// `<stem>_<h>x<w>_<rate>kbps.<ext>`
fn artifact_name(source: &SourceAsset, resolution: Resolution, rate_kbps: u32) -> String {
    format!(
        "{}_{}x{}_{}kbps.{}",
        source.stem(),
        resolution.height,
        resolution.width,
        rate_kbps,
        source.extension()
    )
}
