//! Output files reported by the listing endpoint and the naming
//! conventions callers use to tell them apart.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Filename of the final rendered image.
pub const CANONICAL_OUTPUT: &str = "output.png";

const OUTPUT_PREFIX: &str = "output";
const FRAME_PREFIX: &str = "frame-";
const PNG_SUFFIX: &str = ".png";

/// A named file produced by a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputArtifact(String);

impl OutputArtifact {
    /// Artifact for a file name as listed by the service.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// File name relative to the job's output directory.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// `output*.png`, the rendered result rather than an auxiliary file.
    pub fn is_rendered_output(&self) -> bool {
        let lower = self.0.to_ascii_lowercase();
        lower.starts_with(OUTPUT_PREFIX) && lower.ends_with(PNG_SUFFIX)
    }

    /// Index of an intermediate frame (`frame-00012.png` -> 12).
    pub fn frame_index(&self) -> Option<u32> {
        self.0
            .strip_prefix(FRAME_PREFIX)?
            .strip_suffix(PNG_SUFFIX)?
            .parse()
            .ok()
    }
}

impl fmt::Display for OutputArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OutputArtifact {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for OutputArtifact {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Body of `GET /api/jobs/{id}/outputs`.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputListing {
    pub files: Vec<OutputArtifact>,
}

/// Pick the rendered output, preferring [`CANONICAL_OUTPUT`].
pub fn rendered_output(artifacts: &[OutputArtifact]) -> Option<&OutputArtifact> {
    artifacts
        .iter()
        .find(|a| a.name() == CANONICAL_OUTPUT)
        .or_else(|| artifacts.iter().find(|a| a.is_rendered_output()))
}

/// Intermediate frames ordered by frame index.
pub fn frames(artifacts: &[OutputArtifact]) -> Vec<&OutputArtifact> {
    let mut frames: Vec<(u32, &OutputArtifact)> = artifacts
        .iter()
        .filter_map(|a| a.frame_index().map(|i| (i, a)))
        .collect();
    frames.sort_by_key(|(i, _)| *i);
    frames.into_iter().map(|(_, a)| a).collect()
}
