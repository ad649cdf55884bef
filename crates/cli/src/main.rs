use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use deployer::{CommandRunner, DeployerSettings, SystemRunner};
use kubetest_core::{BuildStrategy, ExtractSpec, RunOptions, StageStrategy};
use orchestrator::{RunEnvironment, RunOrchestrator};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_DIR: &str = "kubetest";
const DEPLOYER_CONFIG_FILE: &str = "deployers.toml";

#[derive(Parser, Debug)]
#[command(name = "kubetest")]
#[command(about = "Build, deploy and test kubernetes end to end", long_about = None)]
#[command(version)]
struct Cli {
    /// Rebuild k8s binaries, optionally forcing (release|quick|bazel) strategy
    #[arg(long, value_name = "MODE", num_args = 0..=1, default_missing_value = "true")]
    build: Option<String>,

    /// Upload binaries to gs://bucket/devel/job-suffix if set
    #[arg(long, value_name = "LOCATION")]
    stage: Option<String>,

    /// Extract k8s binaries from the specified release location
    #[arg(long, value_name = "LOCATOR")]
    extract: Vec<String>,

    /// Choices: none/bash/kops/kubernetes-anywhere
    #[arg(long, default_value = "bash")]
    deployment: String,

    /// Start the e2e cluster. If the cluster is already up, recreate it
    #[arg(long)]
    up: bool,

    /// Tear down the cluster before exiting
    #[arg(long)]
    down: bool,

    /// Run the e2e tests
    #[arg(long)]
    test: bool,

    /// Space-separated list of arguments to pass to the test runner
    #[arg(long = "test_args", default_value = "", allow_hyphen_values = true)]
    test_args: String,

    /// If set, run upgrade tests before other tests
    #[arg(long = "upgrade_args", default_value = "", allow_hyphen_values = true)]
    upgrade_args: String,

    /// Command that runs the tests
    #[arg(long = "test-command", default_value = kubetest_core::DEFAULT_TEST_COMMAND)]
    test_command: String,

    /// Run tests from the other release checkout in ../kubernetes_skew
    #[arg(long)]
    skew: bool,

    /// Verify client and server versions match
    #[arg(
        long = "check-version-skew",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = true,
        default_missing_value = "true"
    )]
    check_version_skew: bool,

    #[arg(long = "check_version_skew", action = ArgAction::Set, hide = true)]
    deprecated_check_version_skew: Option<bool>,

    /// Start/tear down the federation control plane along with the clusters
    #[arg(long)]
    federation: bool,

    /// Save credentials on --up, or load them from there without --up
    #[arg(long, value_name = "LOCATION")]
    save: Option<String>,

    /// Publish the tested version to this location on success
    #[arg(long, value_name = "LOCATION")]
    publish: Option<String>,

    /// Write logs, the junit report and metadata to this directory
    #[arg(long, value_name = "DIR")]
    dump: Option<PathBuf>,

    /// Stop testing after this long (s/m/h), 0 disables
    #[arg(long, default_value = "0", value_parser = parse_duration)]
    timeout: Duration,

    /// TOML file with kops and kubernetes-anywhere settings
    #[arg(long = "deployer-config", value_name = "FILE")]
    deployer_config: Option<PathBuf>,

    /// Print all command output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn run_options(&self) -> Result<RunOptions> {
        let check_version_skew = match self.deprecated_check_version_skew {
            Some(false) => {
                tracing::warn!(
                    "--check_version_skew is deprecated. Please change to --check-version-skew"
                );
                false
            }
            _ => self.check_version_skew,
        };

        Ok(RunOptions {
            build: BuildStrategy::parse(self.build.as_deref().unwrap_or_default())?,
            stage: StageStrategy::parse(self.stage.as_deref().unwrap_or_default())?,
            extract: ExtractSpec::parse_all(self.extract.iter().map(String::as_str))?,
            deployment: self.deployment.clone(),
            up: self.up,
            down: self.down,
            test: self.test,
            federation: self.federation,
            save: non_empty(&self.save),
            publish: non_empty(&self.publish),
            dump: self.dump.clone().filter(|dir| !dir.as_os_str().is_empty()),
            test_command: self.test_command.clone(),
            test_args: self.test_args.clone(),
            upgrade_args: self.upgrade_args.clone(),
            skew: self.skew,
            check_version_skew,
            timeout: self.timeout,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.is_empty())
}

/// Parse `90`, `30s`, `5m`, `2h` or combinations such as `1h30m`.
fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in value.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(format!("invalid duration {value:?}: unknown unit {c:?}")),
        };
        let amount: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration {value:?}: missing number before {c:?}"))?;
        total = amount
            .checked_mul(unit)
            .and_then(|seconds| total.checked_add(seconds))
            .ok_or_else(|| format!("invalid duration {value:?}: too large"))?;
        digits.clear();
    }
    if !digits.is_empty() || value.is_empty() {
        return Err(format!("invalid duration {value:?}: expected a unit (s/m/h)"));
    }
    Ok(Duration::from_secs(total))
}

fn default_deployer_config() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR).join(DEPLOYER_CONFIG_FILE))
        .filter(|path| path.exists())
}

async fn load_settings(path: Option<&Path>) -> Result<DeployerSettings> {
    let path = match path {
        Some(path) => {
            if !path.exists() {
                bail!("Deployer config {} does not exist", path.display());
            }
            path.to_path_buf()
        }
        None => match default_deployer_config() {
            Some(path) => path,
            None => return Ok(DeployerSettings::default()),
        },
    };

    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let settings = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::info!("Deployer settings: {}", path.display());
    Ok(settings)
}

async fn run(cli: Cli) -> Result<()> {
    let options = cli.run_options()?;
    let settings = load_settings(cli.deployer_config.as_deref()).await?;
    let environment = RunEnvironment::capture().context("Failed to capture environment")?;
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new().with_verbose(cli.verbose));

    let mut orchestrator =
        RunOrchestrator::new(options, environment, runner).with_settings(settings);
    orchestrator.complete().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Something went wrong: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "kubetest=debug,orchestrator=debug,deployer=debug"
    } else {
        "kubetest=info,orchestrator=info,deployer=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubetest_core::{BuildMode, ExtractMode};
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("kubetest").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("1h30").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("18446744073709551615h").is_err());
        assert!(parse_duration("9999999999999999999h9999999999999999999h").is_err());
    }

    #[test]
    fn test_defaults() {
        let options = parse(&[]).run_options().unwrap();
        assert_eq!(options, RunOptions::default());
    }

    #[test]
    fn test_full_flag_surface() {
        let cli = parse(&[
            "--build",
            "--stage=gs://bucket/devel/job",
            "--extract=ci/latest",
            "--extract=v1.6.4",
            "--deployment=kops",
            "--up",
            "--test",
            "--down",
            "--test_args=--ginkgo.focus=Conformance",
            "--federation",
            "--save=gs://bucket/state",
            "--dump=/workspace/_artifacts",
            "--timeout=1h30m",
            "--check-version-skew=false",
        ]);
        let options = cli.run_options().unwrap();

        assert_eq!(options.build.mode(), Some(BuildMode::Quick));
        assert_eq!(options.stage.target().unwrap().suffix, "devel/job");
        assert_eq!(options.extract.len(), 2);
        assert_eq!(options.extract.entries()[0].mode, ExtractMode::Release);
        assert_eq!(options.deployment, "kops");
        assert!(options.up && options.test && options.down && options.federation);
        assert_eq!(options.test_args, "--ginkgo.focus=Conformance");
        assert_eq!(options.save.as_deref(), Some("gs://bucket/state"));
        assert_eq!(options.dump, Some(PathBuf::from("/workspace/_artifacts")));
        assert_eq!(options.timeout, Duration::from_secs(5400));
        assert!(!options.check_version_skew);
    }

    #[test]
    fn test_deprecated_version_skew_flag() {
        let options = parse(&["--check_version_skew=false"]).run_options().unwrap();
        assert!(!options.check_version_skew);

        let options = parse(&["--check_version_skew=true"]).run_options().unwrap();
        assert!(options.check_version_skew);
    }

    #[test]
    fn test_invalid_values() {
        assert!(parse(&["--stage=s3://bucket"]).run_options().is_err());
        assert!(parse(&["--build=cmake"]).run_options().is_err());
        assert!(Cli::try_parse_from(["kubetest", "--timeout=soon"]).is_err());
        assert_eq!(parse(&["--save="]).run_options().unwrap().save, None);
    }

    #[tokio::test]
    async fn test_load_settings() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("deployers.toml");
        std::fs::write(&path, "[kops]\ncluster = \"e2e.example.com\"\nnodes = 4\n").unwrap();

        let settings = load_settings(Some(&path)).await.unwrap();
        assert_eq!(settings.kops.cluster, "e2e.example.com");
        assert_eq!(settings.kops.nodes, 4);
        assert_eq!(settings.kubernetes_anywhere, Default::default());

        assert!(load_settings(Some(&temp.path().join("missing.toml"))).await.is_err());
    }
}
