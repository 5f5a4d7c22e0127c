use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{FramelensError, IoWriteSnafu};

const SUBDIRS: [&str; 5] = ["frames", "detection", "regions", "analytics", "overlay"];

/// Scoped temporary workspace for one batch run.
///
/// Exclusively owned by the run; every intermediate artifact (sampled
/// frames, per-service outputs, analytics text, overlay images) lives
/// under one uuid-named root which is removed unconditionally when the
/// workspace drops, on success and error paths alike.
pub struct SessionDirs {
    root: PathBuf,
}

impl SessionDirs {
    pub fn create() -> Result<Self, FramelensError> {
        let root = std::env::temp_dir().join(format!("framelens-{}", Uuid::new_v4()));
        for sub in SUBDIRS {
            let dir = root.join(sub);
            std::fs::create_dir_all(&dir).context(IoWriteSnafu {
                path: dir.display().to_string(),
            })?;
        }
        debug!("session workspace at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames(&self) -> PathBuf {
        self.root.join("frames")
    }

    pub fn detection(&self) -> PathBuf {
        self.root.join("detection")
    }

    pub fn regions(&self) -> PathBuf {
        self.root.join("regions")
    }

    pub fn analytics(&self) -> PathBuf {
        self.root.join("analytics")
    }

    pub fn overlay(&self) -> PathBuf {
        self.root.join("overlay")
    }
}

impl Drop for SessionDirs {
    fn drop(&mut self) {
        debug!("removing session workspace {}", self.root.display());
        if let Err(err) = std::fs::remove_dir_all(&self.root) {
            warn!(
                "could not remove session workspace {}: {err}",
                self.root.display()
            );
        }
    }
}
