//! Writes submitted sketches to the scratch directory.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use pi_sketch_core::error::{Result, SketchError};

/// Where finished sketches land.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Decode a submitted payload and write it as `sketch-<unix-ms>.png`.
    ///
    /// The file only appears under its final name once fully written.
    pub async fn save(&self, payload: &str) -> Result<PathBuf> {
        let bytes = decode_payload(payload)?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            SketchError::Persist(format!("cannot create {}: {e}", self.dir.display()))
        })?;

        let path = self.next_path().await?;
        let tmp_path = path.with_extension("png.tmp");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| SketchError::Persist(format!("cannot write {}: {e}", tmp_path.display())))?;

        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(SketchError::Persist(format!(
                "cannot write {}: {e}",
                path.display()
            )));
        }

        debug!(path = %path.display(), bytes = bytes.len(), "Sketch written");
        Ok(path)
    }

    /// First free `sketch-<ms>.png`, starting from the current time.
    async fn next_path(&self) -> Result<PathBuf> {
        let dir = std::path::absolute(&self.dir)?;
        let mut millis = chrono::Utc::now().timestamp_millis();
        loop {
            let candidate = dir.join(format!("sketch-{millis}.png"));
            if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(candidate);
            }
            millis += 1;
        }
    }
}

/// Decode a bare base64 string or a `data:...;base64,` URL.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>> {
    let trimmed = payload.trim();
    let encoded = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| SketchError::Decode("data URL is not base64".into()))?,
        None => trimmed,
    };
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| SketchError::Decode(e.to_string()))
}
