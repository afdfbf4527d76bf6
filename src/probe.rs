use std::path::Path;

use crate::foundation::{
    core::{Resolution, SourceAsset},
    error::{HullError, HullResult},
};

#[derive(Debug, serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    bit_rate: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ProbeFormat {
    bit_rate: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// Source of native metadata for the batch driver.
pub trait SourceProber: Sync {
    fn probe(&self, source_path: &Path) -> HullResult<SourceAsset>;
}

/// [`SourceProber`] backed by the system `ffprobe`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfprobeProber;

impl SourceProber for FfprobeProber {
    fn probe(&self, source_path: &Path) -> HullResult<SourceAsset> {
        probe_source(source_path)
    }
}

pub fn is_ffprobe_on_path() -> bool {
    std::process::Command::new("ffprobe")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Native resolution and bitrate of `source_path`, via the system `ffprobe`.
#[tracing::instrument]
pub fn probe_source(source_path: &Path) -> HullResult<SourceAsset> {
    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| HullError::probe(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(HullError::probe(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let (resolution, bitrate_kbps) = parse_probe_json(&out.stdout)?;
    tracing::debug!(%resolution, bitrate_kbps, "probed source");
    Ok(SourceAsset::new(source_path, resolution, bitrate_kbps))
}

/// Resolution of the first video stream plus its bitrate in kbps, falling back to the container
/// bitrate when the stream does not report one.
fn parse_probe_json(bytes: &[u8]) -> HullResult<(Resolution, u32)> {
    let parsed: ProbeOut = serde_json::from_slice(bytes)
        .map_err(|e| HullError::probe(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| HullError::probe("no video stream found"))?;
    let width = video
        .width
        .ok_or_else(|| HullError::probe("missing video width from ffprobe"))?;
    let height = video
        .height
        .ok_or_else(|| HullError::probe("missing video height from ffprobe"))?;
    let resolution = Resolution::new(height, width);
    resolution.validate().map_err(|e| HullError::probe(e.to_string()))?;

    let bits = video
        .bit_rate
        .as_deref()
        .and_then(parse_bits)
        .or_else(|| {
            parsed
                .format
                .as_ref()
                .and_then(|f| f.bit_rate.as_deref())
                .and_then(parse_bits)
        })
        .ok_or_else(|| HullError::probe("ffprobe reported no bitrate for stream or container"))?;
    let kbps = u32::try_from(bits / 1000)
        .map_err(|_| HullError::probe(format!("bitrate {bits} bps is out of range")))?;
    Ok((resolution, kbps))
}

fn parse_bits(s: &str) -> Option<u64> {
    s.trim().parse::<u64>().ok().filter(|&b| b > 0)
}
