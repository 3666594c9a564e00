//! Per-job output files
//!
//! Artifacts live under `<outputs>/<job_id>/` with fixed names. Grids are
//! written in NumPy `.npy` v1.0 format (row-major, little endian) so they
//! load directly with `numpy.load`.

use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::models::{Mask, ProbabilityMap};

/// Files written for each job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    BeforeImage,
    AfterImage,
    HighlightImage,
    Probability,
    Mask,
    Metrics,
    Explanation,
}

impl Artifact {
    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::BeforeImage => "forest_Tprev.png",
            Artifact::AfterImage => "forest_T0.png",
            Artifact::HighlightImage => "deforestation_highlight.png",
            Artifact::Probability => "deforestation_probability.npy",
            Artifact::Mask => "deforestation_mask.npy",
            Artifact::Metrics => "metrics.json",
            Artifact::Explanation => "explanation.json",
        }
    }

    /// Image artifact for a `/api/images/{job_id}/{kind}` path segment
    pub fn image_from_kind(kind: &str) -> Option<Artifact> {
        match kind {
            "before" => Some(Artifact::BeforeImage),
            "after" => Some(Artifact::AfterImage),
            "highlight" => Some(Artifact::HighlightImage),
            _ => None,
        }
    }
}

/// Flat-file store rooted at the outputs directory
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    pub fn path(&self, job_id: Uuid, artifact: Artifact) -> PathBuf {
        self.job_dir(job_id).join(artifact.file_name())
    }

    /// Write raw bytes, creating the job directory as needed
    pub async fn write(
        &self,
        job_id: Uuid,
        artifact: Artifact,
        bytes: &[u8],
    ) -> Result<PathBuf, AnalysisError> {
        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            AnalysisError::Output(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(artifact.file_name());
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AnalysisError::Output(format!("cannot write {}: {}", path.display(), e)))?;

        tracing::debug!(job_id = %job_id, path = %path.display(), bytes = bytes.len(), "Wrote artifact");
        Ok(path)
    }

    /// Write a value as pretty-printed JSON
    pub async fn write_json<T: Serialize + ?Sized>(
        &self,
        job_id: Uuid,
        artifact: Artifact,
        value: &T,
    ) -> Result<PathBuf, AnalysisError> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| AnalysisError::Output(format!("cannot serialize {}: {}", artifact.file_name(), e)))?;
        self.write(job_id, artifact, &bytes).await
    }

    /// Read an artifact back
    pub async fn read(&self, job_id: Uuid, artifact: Artifact) -> Result<Vec<u8>, AnalysisError> {
        let path = self.path(job_id, artifact);
        tokio::fs::read(&path)
            .await
            .map_err(|e| AnalysisError::Output(format!("cannot read {}: {}", path.display(), e)))
    }
}

/// Encode a probability grid as `<f4` `.npy`
pub fn probability_npy(map: &ProbabilityMap) -> Vec<u8> {
    let mut data = Vec::with_capacity(map.values().len() * 4);
    for value in map.values() {
        data.extend_from_slice(&value.to_le_bytes());
    }
    npy("<f4", map.height(), map.width(), data)
}

/// Encode a mask as `|u1` `.npy` (1 = changed)
pub fn mask_npy(mask: &Mask) -> Vec<u8> {
    let data = mask.cells().iter().map(|c| u8::from(*c)).collect();
    npy("|u1", mask.height(), mask.width(), data)
}

fn npy(descr: &str, rows: usize, cols: usize, data: Vec<u8>) -> Vec<u8> {
    const MAGIC: &[u8] = b"\x93NUMPY";
    const PREAMBLE: usize = 10;

    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({}, {}), }}",
        descr, rows, cols
    );
    // Pad so the data starts on a 64-byte boundary; header ends with '\n'
    let unpadded = PREAMBLE + header.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let mut out = Vec::with_capacity(PREAMBLE + header.len() + data.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(&data);
    out
}
