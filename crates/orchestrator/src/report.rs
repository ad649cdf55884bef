//! Timed pass/fail records for every sub-operation of a run, and their
//! JUnit rendering.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

use crate::error::{OrchestratorError, Result};

pub const REPORT_FILE: &str = "junit_runner.xml";
const CLASS_NAME: &str = "kubetest";
const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCase {
    #[serde(rename = "@classname")]
    pub class_name: String,
    #[serde(rename = "@name")]
    pub name: String,
    /// Seconds
    #[serde(rename = "@time")]
    pub time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl TestCase {
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestSuite {
    #[serde(rename = "@failures")]
    pub failures: usize,
    #[serde(rename = "@tests")]
    pub tests: usize,
    #[serde(rename = "@time")]
    pub time: f64,
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    #[serde(rename = "testcase")]
    pub cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(cases: Vec<TestCase>, started_at: DateTime<Utc>, elapsed: Duration) -> Self {
        Self {
            failures: cases.iter().filter(|case| case.failed()).count(),
            tests: cases.len(),
            time: elapsed.as_secs_f64(),
            timestamp: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            cases,
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut body = String::new();
        let mut serializer = quick_xml::se::Serializer::with_root(&mut body, Some("testsuite"))
            .map_err(|e| OrchestratorError::Report(e.to_string()))?;
        serializer.indent(' ', 4);
        self.serialize(serializer)
            .map_err(|e| OrchestratorError::Report(e.to_string()))?;
        Ok(format!("{XML_HEADER}{body}\n"))
    }

    /// Write `junit_runner.xml` into `dir`, creating it when missing.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE);
        std::fs::write(&path, self.to_xml()?)?;
        info!(path = %path.display(), "Saved XML output");
        Ok(path)
    }
}

/// Append-only record of sub-operations. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct ResultRecorder {
    cases: Arc<Mutex<Vec<TestCase>>>,
}

impl ResultRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TestCase>> {
        self.cases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, name: &str, elapsed: Duration, failure: Option<String>) {
        self.lock().push(TestCase {
            class_name: CLASS_NAME.to_string(),
            name: name.to_string(),
            time: elapsed.as_secs_f64(),
            failure,
        });
    }

    /// Time `operation`, record its outcome under `name` and hand the
    /// outcome back unchanged.
    pub async fn wrap<T, E, F>(&self, name: &str, operation: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        info!(step = %name, "Running");
        let started = Instant::now();
        let result = operation.await;
        let elapsed = started.elapsed();

        let failure = match &result {
            Ok(_) => {
                info!(step = %name, ?elapsed, "Step finished");
                None
            }
            Err(e) => {
                error!(step = %name, ?elapsed, error = %e, "Step failed");
                Some(e.to_string())
            }
        };
        self.record(name, elapsed, failure);
        result
    }

    pub fn cases(&self) -> Vec<TestCase> {
        self.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|case| case.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn failures(&self) -> usize {
        self.lock().iter().filter(|case| case.failed()).count()
    }

    pub fn suite(&self, started_at: DateTime<Utc>, elapsed: Duration) -> TestSuite {
        TestSuite::new(self.cases(), started_at, elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_wrap_records_success_and_failure() {
        let recorder = ResultRecorder::new();

        let ok: std::result::Result<u32, String> = recorder.wrap("Build", async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let failed: std::result::Result<(), String> = recorder
            .wrap("Extract", async { Err("no such release".to_string()) })
            .await;
        assert!(failed.is_err());

        assert_eq!(recorder.names(), vec!["Build", "Extract"]);
        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.failures(), 1);
        assert_eq!(
            recorder.cases()[1].failure.as_deref(),
            Some("no such release")
        );
    }

    #[test]
    fn test_clones_share_records() {
        let recorder = ResultRecorder::new();
        let other = recorder.clone();
        other.record("tearDown", Duration::from_millis(1500), None);
        assert_eq!(recorder.names(), vec!["tearDown"]);
    }

    #[test]
    fn test_suite_counts_match_records() {
        let recorder = ResultRecorder::new();
        recorder.record("bringUp", Duration::from_secs(2), None);
        recorder.record("runTests", Duration::from_secs(3), Some("exit 1".into()));
        recorder.record("tearDown", Duration::from_secs(1), None);

        let suite = recorder.suite(Utc::now(), Duration::from_secs(6));
        assert_eq!(suite.tests, 3);
        assert_eq!(suite.failures, 1);
        assert_eq!(suite.time, 6.0);
    }

    #[test]
    fn test_xml_shape() {
        let recorder = ResultRecorder::new();
        recorder.record("isUp", Duration::from_millis(500), None);
        recorder.record("runTests", Duration::from_secs(1), Some("exit status 1".into()));

        let xml = recorder
            .suite(Utc::now(), Duration::from_secs(2))
            .to_xml()
            .unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\""));
        assert!(xml.contains("<testsuite failures=\"1\" tests=\"2\" time=\"2\""));
        assert!(xml.contains("<testcase classname=\"kubetest\" name=\"isUp\" time=\"0.5\""));
        assert!(xml.contains("<failure>exit status 1</failure>"));
    }

    #[test]
    fn test_write_creates_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("artifacts");

        let path = ResultRecorder::new()
            .suite(Utc::now(), Duration::ZERO)
            .write(&dir)
            .unwrap();

        assert_eq!(path, dir.join(REPORT_FILE));
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("tests=\"0\""));
    }
}
