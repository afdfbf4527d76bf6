use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::Context as _;

use crate::foundation::error::HullResult;

static NEXT_SCRATCH_ID: AtomicU64 = AtomicU64::new(0);

/// Per-invocation directory for transient encodes and score logs.
///
/// The name is unique across threads and processes sharing `root`, so concurrent resolves never
/// see each other's files. Everything underneath is removed when the guard drops, on success,
/// failure, cancellation or unwind alike.
#[derive(Debug)]
pub struct ScratchDir {
    path: Option<PathBuf>,
}

impl ScratchDir {
    pub fn create(root: &Path, label: &str) -> HullResult<Self> {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = root.join(format!(
            "ratehull_{}_{}_{}_{}",
            sanitize(label),
            std::process::id(),
            NEXT_SCRATCH_ID.fetch_add(1, Ordering::Relaxed),
            nanos
        ));
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create scratch directory '{}'", path.display()))?;
        Ok(Self { path: Some(path) })
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new("."))
    }

    pub fn join(&self, file_name: impl AsRef<Path>) -> PathBuf {
        self.path().join(file_name)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(path) = self.path.take()
            && let Err(e) = std::fs::remove_dir_all(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch directory");
        }
    }
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
