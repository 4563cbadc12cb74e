//! Pagecheck CLI - Main Entry Point
//!
//! Runs declarative YAML scenarios against a live web application and
//! reports per-scenario outcomes, artifacts and a summary table.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use pagecheck_harness::driver::Browser;
use pagecheck_harness::scenario::{Scenario, Viewport};
use pagecheck_harness::session::SessionConfig;
use pagecheck_harness::{RunnerConfig, ScenarioRunner};

mod output;

/// Pagecheck - scenario-driven browser verification
#[derive(Parser)]
#[command(name = "pagecheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios against a live application
    Run(RunArgs),

    /// List scenarios and their tags without running them
    List(ScenarioArgs),

    /// Parse and validate scenario files without running them
    Validate(ScenarioArgs),
}

#[derive(clap::Args)]
struct ScenarioArgs {
    /// Directory of scenario YAML files
    #[arg(long, default_value = "scenarios")]
    scenarios: PathBuf,

    /// Only scenarios carrying this tag
    #[arg(long)]
    tag: Option<String>,

    /// Only the scenario with this exact name
    #[arg(long)]
    name: Option<String>,
}

#[derive(clap::Args)]
struct RunArgs {
    #[command(flatten)]
    scenarios: ScenarioArgs,

    /// Base URL of the application under test
    #[arg(long, env = "PAGECHECK_BASE_URL", default_value = "http://localhost:1420")]
    base_url: String,

    /// Browser engine
    #[arg(long, default_value = "chromium")]
    browser: String,

    /// Run the browser with a visible window
    #[arg(long)]
    headed: bool,

    /// Initial viewport width
    #[arg(long, default_value_t = 1280)]
    viewport_width: u32,

    /// Initial viewport height
    #[arg(long, default_value_t = 720)]
    viewport_height: u32,

    /// Wait up to this many seconds for the app to answer over HTTP
    /// before the first scenario
    #[arg(long)]
    wait_for_app: Option<u64>,

    /// Directory for screenshots and DOM dumps
    #[arg(long, default_value = "verification/artifacts")]
    artifacts: PathBuf,

    /// Directory for the JSON results file
    #[arg(long, default_value = "verification")]
    output: PathBuf,

    /// Capture a DOM dump alongside every checkpoint screenshot
    #[arg(long)]
    dom_dumps: bool,
}

fn load_scenarios(args: &ScenarioArgs) -> anyhow::Result<Vec<Scenario>> {
    let mut scenarios = Scenario::load_all(&args.scenarios)?;
    if let Some(tag) = &args.tag {
        scenarios = Scenario::filter_by_tag(scenarios, tag);
    }
    if let Some(name) = &args.name {
        scenarios.retain(|s| &s.name == name);
    }
    Ok(scenarios)
}

async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let scenarios = load_scenarios(&args.scenarios)?;
    if scenarios.is_empty() {
        anyhow::bail!("no scenarios matched under {}", args.scenarios.scenarios.display());
    }

    let browser = Browser::parse(&args.browser);

    let config = RunnerConfig {
        session: SessionConfig {
            base_url: args.base_url,
            viewport: Viewport { width: args.viewport_width, height: args.viewport_height },
            browser,
            headless: !args.headed,
            reachability_timeout: args.wait_for_app.map(Duration::from_secs),
            ..SessionConfig::default()
        },
        artifact_dir: args.artifacts,
        output_dir: args.output,
        dom_dumps: args.dom_dumps,
    };

    let runner = ScenarioRunner::new(config);
    let summary = runner.run(&scenarios).await;
    runner.write_results(&summary)?;

    output::print_summary(&summary);
    Ok(summary.exit_code())
}

/// 0 when everything passed, 1 when scenarios failed, 2 for faults in the
/// harness itself (unreadable scenarios, unwritable results, and the like).
fn exit_code_for(result: &anyhow::Result<i32>) -> i32 {
    match result {
        Ok(code) => *code,
        Err(_) => 2,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::List(args) => load_scenarios(&args).map(|scenarios| {
            output::print_scenario_list(&scenarios);
            0
        }),
        Commands::Validate(args) => load_scenarios(&args).map(|scenarios| {
            output::print_success(&format!("{} scenario(s) valid", scenarios.len()));
            0
        }),
    };

    if let Err(e) = &result {
        output::print_error(&format!("{e:#}"));
    }
    std::process::exit(exit_code_for(&result));
}
