use std::{
    io::Read as _,
    path::Path,
    process::{Command, Stdio},
    time::Duration,
};

use crate::{
    backend::{EncodeJob, EncodedArtifact, QualityBackend, ScoreJob},
    cancel::CancelToken,
    foundation::{
        core::Resolution,
        error::{HullError, HullResult},
    },
};

/// Settings for [`FfmpegBackend`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FfmpegBackendOpts {
    /// Value for `-c:v`.
    pub video_codec: String,
    /// `n_threads` handed to libvmaf.
    pub vmaf_threads: u32,
    /// `flags` for the upscale applied to candidates before scoring.
    pub scale_flags: String,
    /// How often a running child checks the cancellation token.
    pub poll_interval_ms: u64,
}

impl Default for FfmpegBackendOpts {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            vmaf_threads: 8,
            scale_flags: "bicubic".to_string(),
            poll_interval_ms: 50,
        }
    }
}

impl FfmpegBackendOpts {
    pub fn validate(&self) -> HullResult<()> {
        if self.video_codec.trim().is_empty() {
            return Err(HullError::validation("video_codec must not be empty"));
        }
        if self.vmaf_threads == 0 {
            return Err(HullError::validation("vmaf_threads must be >= 1"));
        }
        if self.scale_flags.trim().is_empty() {
            return Err(HullError::validation("scale_flags must not be empty"));
        }
        Ok(())
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// `true` when the system ffmpeg was built with the libvmaf filter.
pub fn is_libvmaf_available() -> bool {
    Command::new("ffmpeg")
        .args(["-hide_banner", "-filters"])
        .stderr(Stdio::null())
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).contains("libvmaf"))
        .unwrap_or(false)
}

/// [`QualityBackend`] over the system `ffmpeg`: encodes with `-b:v`, scores with libvmaf.
#[derive(Clone, Debug)]
pub struct FfmpegBackend {
    opts: FfmpegBackendOpts,
}

impl FfmpegBackend {
    pub fn new(opts: FfmpegBackendOpts) -> HullResult<Self> {
        opts.validate()?;
        if !is_ffmpeg_on_path() {
            return Err(HullError::validation(
                "ffmpeg is required for encoding and scoring, but was not found on PATH",
            ));
        }
        Ok(Self { opts })
    }

    pub fn opts(&self) -> &FfmpegBackendOpts {
        &self.opts
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.opts.poll_interval_ms.max(1))
    }
}

impl QualityBackend for FfmpegBackend {
    fn encode(&self, job: &EncodeJob<'_>, cancel: &CancelToken) -> HullResult<EncodedArtifact> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-y", "-loglevel", "error", "-i"])
            .arg(job.source.path())
            .args(encode_args(&self.opts, job.resolution, job.rate_kbps))
            .arg(&job.out_path);
        tracing::debug!(
            resolution = %job.resolution,
            rate_kbps = job.rate_kbps,
            out = %job.out_path.display(),
            "encoding"
        );

        run_cancellable(cmd, cancel, self.poll_interval(), "encode", |msg| {
            HullError::encode(job.resolution, job.rate_kbps, msg)
        })?;
        if !job.out_path.is_file() {
            return Err(HullError::encode(
                job.resolution,
                job.rate_kbps,
                format!("ffmpeg produced no output at '{}'", job.out_path.display()),
            ));
        }

        Ok(EncodedArtifact {
            path: job.out_path.clone(),
            resolution: job.resolution,
            rate_kbps: job.rate_kbps,
        })
    }

    fn score(&self, job: &ScoreJob<'_>, cancel: &CancelToken) -> HullResult<f64> {
        let artifact = job.artifact;
        let filter = vmaf_filter(&self.opts, job.reference_resolution, &job.log_path);
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-loglevel", "error", "-i"])
            .arg(&artifact.path)
            .arg("-i")
            .arg(job.reference.path())
            .args(["-filter_complex", &filter, "-f", "null", "-"]);
        tracing::debug!(candidate = %artifact.path.display(), "computing vmaf");

        let fail = |msg: String| HullError::score(artifact.resolution, artifact.rate_kbps, msg);
        run_cancellable(cmd, cancel, self.poll_interval(), "score", fail)?;
        parse_vmaf_log(&job.log_path).map_err(fail)
    }
}

fn encode_args(opts: &FfmpegBackendOpts, resolution: Resolution, rate_kbps: u32) -> Vec<String> {
    vec![
        "-an".to_string(),
        "-c:v".to_string(),
        opts.video_codec.clone(),
        "-b:v".to_string(),
        format!("{rate_kbps}k"),
        "-s".to_string(),
        resolution.to_filter_string(),
    ]
}

/// Upscale input 0 (the candidate) to the reference size, then libvmaf against input 1.
fn vmaf_filter(opts: &FfmpegBackendOpts, reference: Resolution, log_path: &Path) -> String {
    format!(
        "[0:v]scale={}:{}:flags={}[main];[main][1:v]libvmaf=n_threads={}:log_fmt=json:log_path={}",
        reference.width,
        reference.height,
        opts.scale_flags,
        opts.vmaf_threads,
        escape_filter_value(&log_path.to_string_lossy())
    )
}

/// Escape a value for use as a filter option inside a `-filter_complex` graph.
///
/// ffmpeg unescapes twice: the graph parser first, then the filter's option parser. Each level
/// gets its own backslash escaping, applied innermost first.
fn escape_filter_value(v: &str) -> String {
    let option_level = backslash_escape(v, &['\\', '\'', ':']);
    backslash_escape(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}

fn backslash_escape(v: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(v.len());
    for c in v.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, serde::Deserialize)]
struct VmafLog {
    pooled_metrics: PooledMetrics,
}

#[derive(Debug, serde::Deserialize)]
struct PooledMetrics {
    vmaf: VmafMetric,
}

#[derive(Debug, serde::Deserialize)]
struct VmafMetric {
    mean: f64,
}

/// Pooled mean VMAF from a libvmaf JSON log.
fn parse_vmaf_log(log_path: &Path) -> Result<f64, String> {
    let bytes = std::fs::read(log_path)
        .map_err(|e| format!("failed to read vmaf log '{}': {e}", log_path.display()))?;
    let log: VmafLog = serde_json::from_slice(&bytes)
        .map_err(|e| format!("failed to parse vmaf log '{}': {e}", log_path.display()))?;
    Ok(log.pooled_metrics.vmaf.mean)
}

/// Run `cmd` to completion, killing it if `cancel` trips first.
///
/// Cancellation is reported as [`HullError::Cancelled`]; spawn failures and non-zero exits go
/// through `fail` with ffmpeg's stderr.
fn run_cancellable(
    mut cmd: Command,
    cancel: &CancelToken,
    poll: Duration,
    what: &str,
    fail: impl FnOnce(String) -> HullError,
) -> HullResult<()> {
    cancel.check(what)?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => return Err(fail(format!("failed to spawn ffmpeg: {e}"))),
    };

    // Drain stderr on the side so a chatty ffmpeg never blocks on a full pipe.
    let stderr_drain = child.stderr.take().map(|mut stderr| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf);
            buf
        })
    });
    let collect_stderr = |drain: Option<std::thread::JoinHandle<Vec<u8>>>| {
        drain
            .and_then(|h| h.join().ok())
            .map(|b| String::from_utf8_lossy(&b).trim().to_string())
            .unwrap_or_default()
    };

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stderr = collect_stderr(stderr_drain);
                if status.success() {
                    return Ok(());
                }
                return Err(fail(format!("ffmpeg exited with status {status}: {stderr}")));
            }
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(fail(format!("failed to wait for ffmpeg: {e}")));
            }
        }

        if let Err(e) = cancel.check(what) {
            tracing::debug!(what, "killing ffmpeg after cancellation");
            let _ = child.kill();
            let _ = child.wait();
            let _ = collect_stderr(stderr_drain);
            return Err(e);
        }
        std::thread::sleep(poll);
    }
}
