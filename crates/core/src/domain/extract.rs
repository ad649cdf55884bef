use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Where a set of test binaries comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractMode {
    /// A published release archive: a version, a version marker or a URL.
    Release,
    /// A release archive already present on local disk.
    LocalPath,
    /// Kubeconfig and version saved by an earlier `--up` run.
    StoredState,
}

impl ExtractMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::LocalPath => "local",
            Self::StoredState => "load",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractStrategy {
    pub mode: ExtractMode,
    pub locator: String,
}

impl ExtractStrategy {
    pub fn new(mode: ExtractMode, locator: impl Into<String>) -> Self {
        Self {
            mode,
            locator: locator.into(),
        }
    }

    /// Parse one `--extract` value.
    ///
    /// `local` and anything that looks like a filesystem path select the
    /// local mode; every other value is treated as a release locator.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CoreError::InvalidExtract("empty locator".to_string()));
        }
        if value == "local" {
            return Ok(Self::new(ExtractMode::LocalPath, "."));
        }
        if let Some(path) = value.strip_prefix("local:") {
            return Ok(Self::new(ExtractMode::LocalPath, path));
        }
        if value.starts_with('/') || value.starts_with("./") || value.starts_with("../") {
            return Ok(Self::new(ExtractMode::LocalPath, value));
        }
        if value.starts_with("load:") {
            return Err(CoreError::InvalidExtract(format!(
                "{value}: stored state is restored through --save"
            )));
        }
        Ok(Self::new(ExtractMode::Release, value))
    }

    pub fn restores_state(&self) -> bool {
        self.mode == ExtractMode::StoredState
    }
}

/// Ordered extraction instructions. Entries run in order and a
/// stored-state entry ends the sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractSpec(Vec<ExtractStrategy>);

impl ExtractSpec {
    pub fn new(entries: Vec<ExtractStrategy>) -> Self {
        Self(entries)
    }

    pub fn parse_all<'a>(values: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        values
            .into_iter()
            .map(ExtractStrategy::parse)
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// A spec that only restores what a previous run saved.
    pub fn restore(save: impl Into<String>) -> Self {
        Self(vec![ExtractStrategy::new(ExtractMode::StoredState, save)])
    }

    pub fn enabled(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn entries(&self) -> &[ExtractStrategy] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
