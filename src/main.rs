//! tap-e2e - end-to-end scenario harness for Trusted Application Pipelines

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tap_e2e::config::HarnessConfig;
use tap_e2e::kube::KubeHarness;
use tap_e2e::scenario::{ScenarioReport, StepOutcome};
use tap_e2e::suites::bitbucket::BitbucketSuite;
use tap_e2e::suites::github::GitHubSuite;
use tap_e2e::suites::gitlab::GitLabSuite;
use tap_e2e::suites::SuiteKind;

/// tap-e2e - drives product scenarios end to end against a live cluster
#[derive(Parser, Debug)]
#[command(name = "tap-e2e", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one suite against the cluster the ambient kubeconfig points at
    Run(RunArgs),

    /// List the known suites
    List,
}

/// Run mode arguments
#[derive(Parser, Debug)]
struct RunArgs {
    /// Suite to run, e.g. `github-advanced`
    #[arg(long)]
    suite: SuiteKind,

    /// Golden-path template the component is scaffolded from
    #[arg(long, env = "SOFTWARE_TEMPLATE", default_value = "go")]
    template: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            for suite in SuiteKind::all() {
                println!("{suite}");
            }
            Ok(())
        }
        Commands::Run(args) => {
            let cfg = HarnessConfig::from_env();
            let kube = KubeHarness::connect().await?;

            let report = match args.suite {
                SuiteKind::GithubAdvanced => {
                    GitHubSuite::connect(cfg, kube)
                        .await?
                        .run_advanced(&args.template)
                        .await
                }
                SuiteKind::GithubBasic => {
                    GitHubSuite::connect(cfg, kube)
                        .await?
                        .run_basic(&args.template)
                        .await
                }
                SuiteKind::GithubJenkins => {
                    GitHubSuite::connect(cfg, kube)
                        .await?
                        .run_jenkins(&args.template)
                        .await
                }
                SuiteKind::GitlabAdvanced => {
                    GitLabSuite::connect(cfg, kube)
                        .await?
                        .run_advanced(&args.template)
                        .await
                }
                SuiteKind::BitbucketBasic => {
                    BitbucketSuite::connect(cfg, kube)
                        .await?
                        .run_basic(&args.template)
                        .await
                }
            };

            print_report(&report);
            if !report.passed() {
                anyhow::bail!("suite {} failed", args.suite);
            }
            Ok(())
        }
    }
}

fn print_report(report: &ScenarioReport) {
    println!();
    println!(
        "scenario {} (run {}): {}",
        report.scenario,
        report.run_id,
        if report.passed() { "PASSED" } else { "FAILED" }
    );
    for step in &report.steps {
        let (mark, detail) = match &step.outcome {
            StepOutcome::Passed => ("ok", String::new()),
            StepOutcome::Failed(reason) => ("FAILED", format!(" - {reason}")),
            StepOutcome::TimedOut(reason) => ("TIMED OUT", format!(" - {reason}")),
        };
        println!(
            "  [{mark}] {} ({}s){detail}",
            step.name,
            step.duration.as_secs()
        );
    }
    if let Some(aborted_at) = &report.aborted_at {
        println!("  aborted at: {aborted_at}");
    }
    if let Some(artifacts_dir) = &report.artifacts_dir {
        println!("  artifacts: {}", artifacts_dir.display());
    }
    if let Some(cleanup_ok) = report.cleanup_ok {
        println!(
            "  cleanup: {}",
            if cleanup_ok { "ok" } else { "reported failures" }
        );
    }
}
