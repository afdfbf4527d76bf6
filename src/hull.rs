use std::{
    io::Write as _,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use serde::Serialize as _;

use crate::foundation::{
    core::Resolution,
    error::{HullError, HullResult},
};

/// Quality attached to a hull point.
///
/// `LadderFloor` marks a point taken without measurement because the ladder had no lower rung
/// to compare against; it serializes as `null`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Quality {
    Measured(f64),
    LadderFloor,
}

impl Quality {
    pub fn score(self) -> Option<f64> {
        match self {
            Self::Measured(s) => Some(s),
            Self::LadderFloor => None,
        }
    }
}

impl From<Option<f64>> for Quality {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Self::LadderFloor, Self::Measured)
    }
}

impl From<Quality> for Option<f64> {
    fn from(q: Quality) -> Self {
        q.score()
    }
}

/// One sample of the rate-distortion hull: the winning resolution at `rate_kbps`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HullPoint {
    pub resolution: Resolution,
    #[serde(rename = "rate")]
    pub rate_kbps: u32,
    #[serde(rename = "qualityScore")]
    pub quality: Quality,
}

impl HullPoint {
    pub fn measured(resolution: Resolution, rate_kbps: u32, score: f64) -> Self {
        Self {
            resolution,
            rate_kbps,
            quality: Quality::Measured(score),
        }
    }

    pub fn ladder_floor(resolution: Resolution, rate_kbps: u32) -> Self {
        Self {
            resolution,
            rate_kbps,
            quality: Quality::LadderFloor,
        }
    }
}

/// Hull points in probe order: rates strictly decreasing, heights non-increasing.
///
/// Only the walker appends; everything else sees a finished, read-only sequence.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct ConvexHull {
    points: Vec<HullPoint>,
}

impl ConvexHull {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-ordered points, rejecting any that break the hull ordering.
    pub fn from_points(points: Vec<HullPoint>) -> HullResult<Self> {
        for pair in points.windows(2) {
            check_successor(&pair[0], &pair[1])?;
        }
        Ok(Self { points })
    }

    pub(crate) fn push(&mut self, point: HullPoint) -> HullResult<()> {
        if let Some(last) = self.points.last() {
            check_successor(last, &point)?;
        }
        self.points.push(point);
        Ok(())
    }

    pub fn points(&self) -> &[HullPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&HullPoint> {
        self.points.last()
    }

    pub fn into_points(self) -> Vec<HullPoint> {
        self.points
    }

    pub fn resolutions(&self) -> impl Iterator<Item = Resolution> + '_ {
        self.points.iter().map(|p| p.resolution)
    }

    pub fn rates(&self) -> impl Iterator<Item = u32> + '_ {
        self.points.iter().map(|p| p.rate_kbps)
    }
}

impl<'a> IntoIterator for &'a ConvexHull {
    type Item = &'a HullPoint;
    type IntoIter = std::slice::Iter<'a, HullPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl<'de> serde::Deserialize<'de> for ConvexHull {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let points = Vec::<HullPoint>::deserialize(deserializer)?;
        Self::from_points(points).map_err(serde::de::Error::custom)
    }
}

fn check_successor(prev: &HullPoint, next: &HullPoint) -> HullResult<()> {
    if next.rate_kbps >= prev.rate_kbps {
        return Err(HullError::validation(format!(
            "hull rates must be strictly decreasing ({} kbps then {} kbps)",
            prev.rate_kbps, next.rate_kbps
        )));
    }
    if prev.resolution.is_below(next.resolution) {
        return Err(HullError::validation(format!(
            "hull resolution moved up from {} to {} at {} kbps",
            prev.resolution, next.resolution, next.rate_kbps
        )));
    }
    Ok(())
}

/// `<dir>/<stem>_convex_hull.json` next to `source`.
pub fn hull_output_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source".to_string());
    source.with_file_name(format!("{stem}_convex_hull.json"))
}

/// Write `hull` as a JSON array, preserving point order, with four-space indentation.
pub fn write_hull_json(path: &Path, hull: &ConvexHull) -> HullResult<()> {
    ensure_parent_dir(path)?;
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    hull.serialize(&mut ser)
        .map_err(|e| HullError::serde(format!("failed to serialize hull: {e}")))?;
    buf.push(b'\n');

    let mut f = std::fs::File::create(path)
        .with_context(|| format!("failed to create hull file '{}'", path.display()))?;
    f.write_all(&buf)
        .with_context(|| format!("failed to write hull file '{}'", path.display()))?;
    Ok(())
}

pub fn read_hull_json(path: &Path) -> HullResult<ConvexHull> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read hull file '{}'", path.display()))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        HullError::serde(format!("failed to parse hull file '{}': {e}", path.display()))
    })
}

pub(crate) fn ensure_parent_dir(path: &Path) -> HullResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}
