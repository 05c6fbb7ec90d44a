use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::artifact::Artifact;
use crate::error::Result;

pub const IMAGE_OUTPUT_DIR: &str = "output_images";
pub const VIDEO_OUTPUT_DIR: &str = "output_videos";

/// Where a run writes its artifacts: `{dir}/{prefix}_{n}.{ext}`
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub dir: PathBuf,
    pub prefix: String,
}

impl OutputSpec {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// `index` is 1-based.
    pub fn file_path(&self, index: usize, extension: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.{}", self.prefix, index, extension))
    }
}

/// Write every artifact and return the written paths in order.
///
/// The directory is created even when there is nothing to write.
pub async fn save_artifacts(spec: &OutputSpec, artifacts: &[Artifact]) -> Result<Vec<PathBuf>> {
    ensure_dir(&spec.dir).await?;

    if artifacts.is_empty() {
        warn!("No artifacts in response, nothing written to {:?}", spec.dir);
        return Ok(Vec::new());
    }

    let mut paths = Vec::with_capacity(artifacts.len());
    for (i, artifact) in artifacts.iter().enumerate() {
        let path = spec.file_path(i + 1, artifact.extension());
        fs::write(&path, &artifact.data).await?;
        debug!("Wrote {} bytes to {:?}", artifact.data.len(), path);
        paths.push(path);
    }

    Ok(paths)
}

async fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).await?;
    }
    Ok(())
}
