//! Per-asset bitrate/resolution convex hull search for adaptive streaming ladders.
//!
//! For a source asset, [`HullWalker`] probes a descending sequence of target bitrates. At each
//! rate it encodes the current best resolution and the next rung down, scores both against the
//! source, keeps the winner and carries it into the next (lower) rate. The result is a
//! [`ConvexHull`]: one [`HullPoint`] per rate whose resolution never moves up the ladder.
//!
//! Encoding and perceptual scoring are delegated to a [`QualityBackend`];
//! [`FfmpegBackend`] drives the system `ffmpeg` with libvmaf.
#![forbid(unsafe_code)]

mod foundation;

pub mod backend;
pub mod batch;
pub mod cancel;
pub mod config;
pub mod encode_ffmpeg;
pub mod hull;
pub mod ladder;
pub mod probe;
pub mod rates;
pub mod resolve;
pub mod scratch;
pub mod walk;

pub use crate::foundation::core::{Resolution, SourceAsset};
pub use crate::foundation::error::{HullError, HullResult};

pub use backend::{EncodeJob, EncodedArtifact, QualityBackend, ScoreJob};
pub use batch::{
    AssetOutcome, AssetReport, BatchOpts, BatchSummary, read_source_list, run_batch,
};
pub use cancel::CancelToken;
pub use config::WalkConfig;
pub use encode_ffmpeg::{FfmpegBackend, FfmpegBackendOpts, is_ffmpeg_on_path, is_libvmaf_available};
pub use hull::{
    ConvexHull, HullPoint, Quality, hull_output_path, read_hull_json, write_hull_json,
};
pub use ladder::ResolutionLadder;
pub use probe::{FfprobeProber, SourceProber, is_ffprobe_on_path, probe_source};
pub use rates::RateConfig;
pub use resolve::RatePointResolver;
pub use scratch::ScratchDir;
pub use walk::{HullWalker, WalkFailure};
