//! Output formatting for the CLI

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use pagecheck_harness::runner::{Outcome, RunSummary};
use pagecheck_harness::Scenario;

/// Print the per-scenario summary table and the run verdict.
pub fn print_summary(summary: &RunSummary) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec!["Scenario", "Outcome", "Steps", "Probes", "Duration"]);
    for result in &summary.results {
        let outcome = match &result.outcome {
            Outcome::Passed => "passed".green().to_string(),
            Outcome::Failed { .. } => "failed".red().to_string(),
            Outcome::Error { .. } => "error".red().bold().to_string(),
        };
        table.add_row(vec![
            result.name.clone(),
            outcome,
            result.steps.len().to_string(),
            result.probes.len().to_string(),
            format!("{} ms", result.duration_ms),
        ]);
    }
    println!("{table}");

    for result in &summary.results {
        match &result.outcome {
            Outcome::Passed => {}
            Outcome::Failed { reason } => {
                println!("{} {}: {}", "✗".red(), result.name, reason);
                for artifact in &result.artifacts {
                    println!("    {}", artifact.path.display());
                }
            }
            Outcome::Error { message } => {
                println!("{} {}: {}", "✗".red(), result.name, message);
            }
        }
    }

    let verdict = format!(
        "{} passed, {} failed of {} ({} ms)",
        summary.passed, summary.failed, summary.total, summary.duration_ms
    );
    if summary.all_passed() {
        println!("{} {}", "✓".green(), verdict.green());
    } else {
        println!("{} {}", "✗".red(), verdict.red());
    }
}

/// Print scenario names, tags and step counts.
pub fn print_scenario_list(scenarios: &[Scenario]) {
    if scenarios.is_empty() {
        println!("No scenarios found.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec!["Scenario", "Tags", "Steps", "Responsive", "Description"]);
    for scenario in scenarios {
        table.add_row(vec![
            scenario.name.clone(),
            scenario.tags.join(", "),
            scenario.steps.len().to_string(),
            if scenario.responsive.is_some() { "yes".to_string() } else { "-".to_string() },
            scenario.description.clone(),
        ]);
    }
    println!("{table}");
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}
