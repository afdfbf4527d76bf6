use std::path::{Path, PathBuf};

use crate::foundation::error::{HullError, HullResult};

/// Frame size of an encode or a source, in pixels.
///
/// Ladder ordering only ever looks at `height`; two resolutions with the same height are the
/// same ladder rung regardless of width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Resolution {
    pub height: u32,
    pub width: u32,
}

impl Resolution {
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    /// `WxH`, the form ffmpeg's `-s` and `scale` accept.
    pub fn to_filter_string(self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// `true` when `self` sits strictly lower on a ladder than `other`.
    pub fn is_below(self, other: Resolution) -> bool {
        self.height < other.height
    }

    pub fn validate(self) -> HullResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(HullError::validation(format!(
                "resolution {self} must have non-zero width and height"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A source asset as the walker sees it: where it lives plus its probed native metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceAsset {
    pub path: PathBuf,
    pub resolution: Resolution,
    pub bitrate_kbps: u32,
}

impl SourceAsset {
    pub fn new(path: impl Into<PathBuf>, resolution: Resolution, bitrate_kbps: u32) -> Self {
        Self {
            path: path.into(),
            resolution,
            bitrate_kbps,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File stem used to derive artifact and output names; falls back to `"source"`.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string())
    }

    /// Extension of the source container, `"mp4"` when the path has none.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp4".to_string())
    }
}
