use deployer::{CommandRunner, CommandSpec};
use tracing::info;

use crate::environment::RunEnvironment;
use crate::error::{OrchestratorError, Result};

const GCE_KEY: [&str; 2] = [".ssh", "google_compute_engine"];

/// Get the machine ready to talk to the provider. Every failure is a
/// [`OrchestratorError::Prepare`].
pub async fn prepare(env: &RunEnvironment, runner: &dyn CommandRunner) -> Result<()> {
    prepare_inner(env, runner).await.map_err(|e| match e {
        OrchestratorError::Prepare(_) => e,
        other => OrchestratorError::Prepare(other.to_string()),
    })
}

async fn prepare_inner(env: &RunEnvironment, runner: &dyn CommandRunner) -> Result<()> {
    match env.provider.as_deref() {
        Some(provider @ ("gce" | "gke" | "kubemark")) => prepare_gcp(env, runner, provider).await?,
        Some("aws") => {
            info!("Installing awscli");
            runner
                .run(&CommandSpec::new("pip").args(["install", "awscli"]))
                .await?;
        }
        _ => {}
    }

    activate_service_account(env, runner).await?;

    let artifacts = env.artifacts_dir();
    tokio::fs::create_dir_all(&artifacts).await?;
    info!(artifacts = %artifacts.display(), "Created artifacts directory");

    if let Some(path) = &env.priority_path {
        info!(path = %path.display(), "Prepending priority path");
        runner.prepend_path(path);
    }
    Ok(())
}

async fn activate_service_account(env: &RunEnvironment, runner: &dyn CommandRunner) -> Result<()> {
    let Some(key) = &env.credentials else {
        return Ok(());
    };
    info!(key_file = %key.display(), "Activating service account");
    let spec = CommandSpec::new("gcloud")
        .args(["auth", "activate-service-account"])
        .arg(format!("--key-file={}", key.display()));
    runner.run(&spec).await?;
    Ok(())
}

async fn prepare_gcp(
    env: &RunEnvironment,
    runner: &dyn CommandRunner,
    provider: &str,
) -> Result<()> {
    let project = env.project.as_deref().ok_or_else(|| {
        OrchestratorError::Prepare(format!(
            "KUBERNETES_PROVIDER={provider} requires setting PROJECT"
        ))
    })?;

    activate_service_account(env, runner).await?;

    info!("Checking existence of GCP ssh keys");
    let private_key = env.home_path(&GCE_KEY);
    let public_key = private_key.with_extension("pub");
    for key in [&private_key, &public_key] {
        if !key.exists() {
            return Err(OrchestratorError::Prepare(format!(
                "missing ssh key {}",
                key.display()
            )));
        }
    }

    info!(project, "Checking presence of public key in project metadata");
    let describe = CommandSpec::new("gcloud")
        .arg("compute")
        .arg(format!("--project={project}"))
        .args(["project-info", "describe"]);
    let metadata = runner.output(&describe).await?;
    let key = tokio::fs::read_to_string(&public_key).await?;

    if !metadata.contains(key.trim()) {
        info!("Uploading public ssh key to project metadata");
        let config_ssh = CommandSpec::new("gcloud")
            .arg("compute")
            .arg(format!("--project={project}"))
            .arg("config-ssh");
        runner.run(&config_ssh).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deployer::testing::ScriptedRunner;
    use std::path::Path;
    use tempfile::TempDir;

    fn env_in(dir: &Path, vars: &[(&str, &str)]) -> RunEnvironment {
        let home = dir.display().to_string();
        let mut all: Vec<(String, String)> = vec![("HOME".into(), home)];
        all.extend(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        RunEnvironment::from_vars(all, dir)
    }

    fn write_keys(dir: &Path) {
        std::fs::create_dir_all(dir.join(".ssh")).unwrap();
        std::fs::write(dir.join(".ssh/google_compute_engine"), "private").unwrap();
        std::fs::write(
            dir.join(".ssh/google_compute_engine.pub"),
            "ssh-rsa AAAA runner\n",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_default_provider() {
        let temp = TempDir::new().unwrap();
        let env = env_in(
            temp.path(),
            &[
                ("GOOGLE_APPLICATION_CREDENTIALS", "/creds.json"),
                ("PRIORITY_PATH", "/opt/bin"),
            ],
        );
        let runner = ScriptedRunner::new();

        prepare(&env, &runner).await.unwrap();

        assert_eq!(
            runner.command_lines(),
            vec!["gcloud auth activate-service-account --key-file=/creds.json"]
        );
        assert!(temp.path().join("_artifacts").is_dir());
        assert_eq!(runner.prepended_paths(), vec![std::path::PathBuf::from("/opt/bin")]);
    }

    #[tokio::test]
    async fn test_gcp_requires_project() {
        let temp = TempDir::new().unwrap();
        let env = env_in(temp.path(), &[("KUBERNETES_PROVIDER", "gce")]);

        let err = prepare(&env, &ScriptedRunner::new()).await.unwrap_err();
        assert!(err.to_string().contains("requires setting PROJECT"));
    }

    #[tokio::test]
    async fn test_gcp_missing_keys() {
        let temp = TempDir::new().unwrap();
        let env = env_in(temp.path(), &[("KUBERNETES_PROVIDER", "gke"), ("PROJECT", "p")]);

        let err = prepare(&env, &ScriptedRunner::new()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Prepare(_)));
        assert!(err.to_string().contains("google_compute_engine"));
    }

    #[tokio::test]
    async fn test_gcp_uploads_key_only_when_absent() {
        let temp = TempDir::new().unwrap();
        write_keys(temp.path());
        let env = env_in(temp.path(), &[("KUBERNETES_PROVIDER", "gce"), ("PROJECT", "e2e")]);

        let runner = ScriptedRunner::new()
            .respond_to("gcloud compute --project=e2e project-info", "items: []");
        prepare(&env, &runner).await.unwrap();
        assert_eq!(runner.count("gcloud compute --project=e2e config-ssh"), 1);

        let runner = ScriptedRunner::new().respond_to(
            "gcloud compute --project=e2e project-info",
            "sshKeys: runner:ssh-rsa AAAA runner",
        );
        prepare(&env, &runner).await.unwrap();
        assert_eq!(runner.count("gcloud compute --project=e2e config-ssh"), 0);
    }

    #[tokio::test]
    async fn test_command_failure_is_prepare_error() {
        let temp = TempDir::new().unwrap();
        let env = env_in(temp.path(), &[("KUBERNETES_PROVIDER", "aws")]);
        let runner = ScriptedRunner::new().fail_on("pip install");

        let err = prepare(&env, &runner).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Prepare(_)));
    }
}
