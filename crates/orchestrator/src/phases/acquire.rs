use deployer::CommandRunner;
use kubetest_core::{ExtractSpec, RunOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{OrchestratorError, Result};
use crate::report::ResultRecorder;
use crate::state::load_kubeconfig;
use crate::strategies::{Build, Extract, Stage, Strategy};
use crate::workspace::Workspace;

/// The extract spec a run actually uses once saved state is taken into account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRewrite {
    pub spec: ExtractSpec,
    /// Save location to restore only the kubeconfig from.
    pub restore_kubeconfig: Option<String>,
}

/// Runs that do not bring a cluster up reuse everything an earlier `--up`
/// run saved. A federation-only bring-up reuses just the kubeconfig.
pub fn rewrite_extract(options: &RunOptions) -> ExtractRewrite {
    let unchanged = ExtractRewrite {
        spec: options.extract.clone(),
        restore_kubeconfig: None,
    };
    let Some(save) = &options.save else {
        return unchanged;
    };

    if !options.up {
        info!(save = %save, "Overwriting extract strategy to load kubeconfig and version");
        ExtractRewrite {
            spec: ExtractSpec::restore(save.clone()),
            restore_kubeconfig: None,
        }
    } else if options.federation && !options.manages_primary_cluster() {
        ExtractRewrite {
            restore_kubeconfig: Some(save.clone()),
            ..unchanged
        }
    } else {
        unchanged
    }
}

async fn run_strategy(recorder: &ResultRecorder, strategy: &dyn Strategy) -> Result<()> {
    if !strategy.enabled() {
        debug!(strategy = strategy.name(), "Strategy disabled");
        return Ok(());
    }
    recorder
        .wrap(strategy.name(), strategy.execute())
        .await
        .map_err(|e| OrchestratorError::in_strategy(strategy.name(), e))
}

/// Build, stage and extract, in that order.
pub async fn acquire(
    options: &RunOptions,
    runner: Arc<dyn CommandRunner>,
    workspace: &Workspace,
    kubeconfig: &Path,
    recorder: &ResultRecorder,
) -> Result<()> {
    let build = Build::new(options.build.clone(), Arc::clone(&runner), workspace.clone());
    run_strategy(recorder, &build).await?;

    let stage = Stage::new(options.stage.clone(), Arc::clone(&runner), workspace.clone());
    run_strategy(recorder, &stage).await?;

    let rewrite = rewrite_extract(options);
    if let Some(save) = &rewrite.restore_kubeconfig {
        load_kubeconfig(runner.as_ref(), save, kubeconfig)
            .await
            .map_err(|e| OrchestratorError::in_strategy("Extract", e))?;
    }

    let extract = Extract::new(rewrite.spec, runner, workspace.clone(), kubeconfig.to_path_buf());
    run_strategy(recorder, &extract).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use deployer::testing::ScriptedRunner;
    use kubetest_core::{BuildStrategy, ExtractMode};
    use tempfile::TempDir;

    fn release_spec() -> ExtractSpec {
        ExtractSpec::parse_all(["v1.7.0", "ci/latest"]).unwrap()
    }

    #[test]
    fn test_no_save_keeps_spec() {
        let options = RunOptions::new("bash").with_extract(release_spec());
        assert_eq!(rewrite_extract(&options).spec, release_spec());
    }

    #[test]
    fn test_not_up_collapses_to_restore() {
        for extract in [ExtractSpec::default(), release_spec()] {
            let options = RunOptions::new("bash")
                .with_lifecycle(false, true, true)
                .with_extract(extract)
                .with_save("gs://bucket/state");

            let rewrite = rewrite_extract(&options);
            assert_eq!(rewrite.spec.len(), 1);
            assert_eq!(rewrite.spec.entries()[0].mode, ExtractMode::StoredState);
            assert_eq!(rewrite.spec.entries()[0].locator, "gs://bucket/state");
            assert_eq!(rewrite.restore_kubeconfig, None);
        }
    }

    #[test]
    fn test_federation_only_restores_kubeconfig() {
        let options = RunOptions::new("none")
            .with_lifecycle(true, false, false)
            .with_federation(true)
            .with_extract(release_spec())
            .with_save("gs://bucket/state");

        let rewrite = rewrite_extract(&options);
        assert_eq!(rewrite.spec, release_spec());
        assert_eq!(rewrite.restore_kubeconfig.as_deref(), Some("gs://bucket/state"));
    }

    #[test]
    fn test_up_with_primary_keeps_spec() {
        let options = RunOptions::new("bash")
            .with_lifecycle(true, true, false)
            .with_federation(true)
            .with_extract(release_spec())
            .with_save("gs://bucket/state");

        assert_eq!(
            rewrite_extract(&options),
            ExtractRewrite {
                spec: release_spec(),
                restore_kubeconfig: None,
            }
        );
    }

    #[tokio::test]
    async fn test_disabled_strategies_are_not_recorded() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let recorder = ResultRecorder::new();

        acquire(
            &RunOptions::new("none"),
            runner.clone(),
            &Workspace::new(temp.path()),
            &temp.path().join("kubeconfig"),
            &recorder,
        )
        .await
        .unwrap();

        assert!(recorder.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_build_is_recorded_and_stops_acquire() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new().fail_on("make"));
        let recorder = ResultRecorder::new();
        let options = RunOptions::new("bash")
            .with_build(BuildStrategy::parse("quick").unwrap())
            .with_extract(release_spec());

        let err = acquire(
            &options,
            runner.clone(),
            &Workspace::new(temp.path()),
            &temp.path().join("kubeconfig"),
            &recorder,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Strategy { ref strategy, .. } if strategy == "Build"
        ));
        assert_eq!(recorder.names(), vec!["Build"]);
        assert_eq!(recorder.failures(), 1);
        assert_eq!(runner.count("gsutil"), 0);
    }

    #[tokio::test]
    async fn test_kubeconfig_restore_is_not_timed_as_extract() {
        let temp = TempDir::new().unwrap();
        let saved = temp.path().join("saved");
        std::fs::create_dir_all(&saved).unwrap();
        std::fs::write(saved.join("kube-config"), "federation").unwrap();

        let recorder = ResultRecorder::new();
        let options = RunOptions::new("none")
            .with_lifecycle(true, false, false)
            .with_federation(true)
            .with_save(saved.display().to_string());

        acquire(
            &options,
            Arc::new(ScriptedRunner::new()),
            &Workspace::new(temp.path()),
            &temp.path().join("kubeconfig"),
            &recorder,
        )
        .await
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(temp.path().join("kubeconfig")).unwrap(),
            "federation"
        );
        assert!(recorder.is_empty());
    }
}
