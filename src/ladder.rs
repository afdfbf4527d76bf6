use crate::foundation::{
    core::Resolution,
    error::{HullError, HullResult},
};

/// Candidate encode resolutions, highest first.
///
/// Construction enforces strictly decreasing heights, so [`ResolutionLadder::next_lower`] is a
/// well-defined successor function. The ladder is immutable once built and is shared freely
/// between concurrent walks.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct ResolutionLadder {
    rungs: Vec<Resolution>,
}

impl ResolutionLadder {
    pub fn new(rungs: Vec<Resolution>) -> HullResult<Self> {
        if rungs.is_empty() {
            return Err(HullError::validation(
                "resolution ladder must have at least one rung",
            ));
        }
        for r in &rungs {
            r.validate()?;
        }
        for pair in rungs.windows(2) {
            if !pair[1].is_below(pair[0]) {
                return Err(HullError::validation(format!(
                    "resolution ladder heights must be strictly decreasing ({} then {})",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(Self { rungs })
    }

    /// 1080p, 720p, 540p, 360p, 270p at 16:9.
    pub fn standard() -> Self {
        Self {
            rungs: vec![
                Resolution::new(1080, 1920),
                Resolution::new(720, 1280),
                Resolution::new(540, 960),
                Resolution::new(360, 640),
                Resolution::new(270, 480),
            ],
        }
    }

    /// First rung strictly shorter than `current`.
    ///
    /// `current` does not have to be a rung (sources usually are not). `None` means `current` is
    /// already at or below the lowest rung: the ladder is exhausted.
    pub fn next_lower(&self, current: Resolution) -> Option<Resolution> {
        self.rungs.iter().copied().find(|r| r.is_below(current))
    }

    pub fn rungs(&self) -> &[Resolution] {
        &self.rungs
    }

    pub fn top(&self) -> Resolution {
        self.rungs[0]
    }

    pub fn lowest(&self) -> Resolution {
        self.rungs[self.rungs.len() - 1]
    }
}

impl Default for ResolutionLadder {
    fn default() -> Self {
        Self::standard()
    }
}

impl<'de> serde::Deserialize<'de> for ResolutionLadder {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rungs = Vec::<Resolution>::deserialize(deserializer)?;
        Self::new(rungs).map_err(serde::de::Error::custom)
    }
}
