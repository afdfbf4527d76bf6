use std::path::PathBuf;

use crate::{
    cancel::CancelToken,
    foundation::{
        core::{Resolution, SourceAsset},
        error::HullResult,
    },
};

/// One encode request: `source` at `resolution` and `rate_kbps`, written to `out_path`.
///
/// `out_path` is chosen by the resolver inside its scratch directory; backends must not write
/// anywhere else.
#[derive(Clone, Debug)]
pub struct EncodeJob<'a> {
    pub source: &'a SourceAsset,
    pub resolution: Resolution,
    pub rate_kbps: u32,
    pub out_path: PathBuf,
}

/// Handle to a finished encode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedArtifact {
    pub path: PathBuf,
    pub resolution: Resolution,
    pub rate_kbps: u32,
}

/// One score request: `artifact` compared against `reference` at `reference_resolution`.
///
/// Candidates below the reference resolution are upscaled by the backend before measuring.
/// Any log the backend needs goes to `log_path`.
#[derive(Clone, Debug)]
pub struct ScoreJob<'a> {
    pub reference: &'a SourceAsset,
    pub reference_resolution: Resolution,
    pub artifact: &'a EncodedArtifact,
    pub log_path: PathBuf,
}

/// Encoder + perceptual quality scorer consumed by the hull walk.
///
/// Both calls are blocking and may be slow. The resolver issues two of each concurrently from
/// different threads, hence `Sync`. Failures are reported as [`HullError::Encode`] /
/// [`HullError::Score`] (or [`HullError::Cancelled`] when `cancel` trips) and are never retried.
///
/// [`HullError::Encode`]: crate::HullError::Encode
/// [`HullError::Score`]: crate::HullError::Score
/// [`HullError::Cancelled`]: crate::HullError::Cancelled
pub trait QualityBackend: Send + Sync {
    fn encode(&self, job: &EncodeJob<'_>, cancel: &CancelToken) -> HullResult<EncodedArtifact>;

    /// Quality of `job.artifact`, nominally in `[0, 100]`.
    fn score(&self, job: &ScoreJob<'_>, cancel: &CancelToken) -> HullResult<f64>;
}

impl<T: QualityBackend + ?Sized> QualityBackend for &T {
    fn encode(&self, job: &EncodeJob<'_>, cancel: &CancelToken) -> HullResult<EncodedArtifact> {
        (**self).encode(job, cancel)
    }

    fn score(&self, job: &ScoreJob<'_>, cancel: &CancelToken) -> HullResult<f64> {
        (**self).score(job, cancel)
    }
}

impl<T: QualityBackend + ?Sized> QualityBackend for std::sync::Arc<T> {
    fn encode(&self, job: &EncodeJob<'_>, cancel: &CancelToken) -> HullResult<EncodedArtifact> {
        (**self).encode(job, cancel)
    }

    fn score(&self, job: &ScoreJob<'_>, cancel: &CancelToken) -> HullResult<f64> {
        (**self).score(job, cancel)
    }
}

impl<T: QualityBackend + ?Sized> QualityBackend for Box<T> {
    fn encode(&self, job: &EncodeJob<'_>, cancel: &CancelToken) -> HullResult<EncodedArtifact> {
        (**self).encode(job, cancel)
    }

    fn score(&self, job: &ScoreJob<'_>, cancel: &CancelToken) -> HullResult<f64> {
        (**self).score(job, cancel)
    }
}
