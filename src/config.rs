use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::{
    foundation::error::{HullError, HullResult},
    ladder::ResolutionLadder,
    rates::RateConfig,
};

/// Everything a [`HullWalker`](crate::HullWalker) needs besides the backend.
///
/// Loaded once, validated, then treated as immutable for the lifetime of the walker. Every field
/// has a default, so a config file only needs to name what it overrides.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    pub ladder: ResolutionLadder,
    pub rates: RateConfig,
    /// Parent of per-resolve scratch directories; `None` means the system temp dir.
    pub scratch_root: Option<PathBuf>,
}

impl WalkConfig {
    pub fn from_path(path: &Path) -> HullResult<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_slice(&bytes).map_err(|e| {
            HullError::serde(format!("failed to parse config '{}': {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> HullResult<()> {
        self.rates.validate()?;
        if let Some(root) = &self.scratch_root
            && root.as_os_str().is_empty()
        {
            return Err(HullError::validation("scratch_root must not be empty"));
        }
        Ok(())
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
