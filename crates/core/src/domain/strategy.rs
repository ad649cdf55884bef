use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// How release binaries get produced from the checked-out tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    Quick,
    Release,
    Bazel,
}

impl BuildMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Release => "release",
            Self::Bazel => "bazel",
        }
    }
}

/// Optional build step. A bare `--build` means a quick build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStrategy(Option<BuildMode>);

impl BuildStrategy {
    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn new(mode: BuildMode) -> Self {
        Self(Some(mode))
    }

    pub fn parse(value: &str) -> Result<Self> {
        let mode = match value {
            "" | "false" => return Ok(Self::disabled()),
            "true" | "quick" => BuildMode::Quick,
            "release" | "make" => BuildMode::Release,
            "bazel" => BuildMode::Bazel,
            other => return Err(CoreError::UnknownBuildMode(other.to_string())),
        };
        Ok(Self::new(mode))
    }

    pub fn enabled(&self) -> bool {
        self.0.is_some()
    }

    pub fn mode(&self) -> Option<BuildMode> {
        self.0
    }
}

/// Bucket and suffix the built release is uploaded under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTarget {
    pub bucket: String,
    pub suffix: String,
}

impl StageTarget {
    pub fn parse(location: &str) -> Result<Self> {
        let invalid = |reason: &str| CoreError::InvalidStageLocation {
            location: location.to_string(),
            reason: reason.to_string(),
        };

        let rest = location
            .strip_prefix("gs://")
            .ok_or_else(|| invalid("must start with gs://"))?;
        let (bucket, suffix) = match rest.split_once('/') {
            Some((bucket, suffix)) => (bucket, suffix.trim_end_matches('/')),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(invalid("missing bucket name"));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            suffix: suffix.to_string(),
        })
    }

    pub fn location(&self) -> String {
        if self.suffix.is_empty() {
            format!("gs://{}", self.bucket)
        } else {
            format!("gs://{}/{}", self.bucket, self.suffix)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStrategy(Option<StageTarget>);

impl StageStrategy {
    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn new(target: StageTarget) -> Self {
        Self(Some(target))
    }

    pub fn parse(value: &str) -> Result<Self> {
        if value.is_empty() {
            return Ok(Self::disabled());
        }
        StageTarget::parse(value).map(Self::new)
    }

    pub fn enabled(&self) -> bool {
        self.0.is_some()
    }

    pub fn target(&self) -> Option<&StageTarget> {
        self.0.as_ref()
    }
}
