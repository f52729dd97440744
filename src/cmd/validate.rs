//! Validate command - resolve every date and amount without printing a ledger

use super::RunArgs;
use clap::Args;
use fincast::core::{check, Warning};
use serde::Serialize;

#[derive(Args, Debug)]
pub struct ValidateCommand {
    #[command(flatten)]
    run: RunArgs,

    /// Also replay the model and report events that would be skipped
    #[arg(long)]
    replay: bool,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

/// JSON output structure
#[derive(Debug, Serialize)]
struct ValidationOutput<'a> {
    issue_count: usize,
    issues: &'a [Warning],
}

impl ValidateCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let (model, config) = self.run.load()?;
        let issues = if self.replay {
            fincast::core::run(&model, &config).warnings
        } else {
            check(&model, config.interval)
        };

        if self.json {
            let output = ValidationOutput {
                issue_count: issues.len(),
                issues: &issues,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_text(&issues);
        }

        // Exit with code 1 if issues found
        if !issues.is_empty() {
            std::process::exit(1);
        }
        Ok(())
    }
}

fn print_text(issues: &[Warning]) {
    println!();
    println!("VALIDATION RESULTS");
    println!();

    if issues.is_empty() {
        println!("\u{2713} No issues found.");
        return;
    }
    println!("\u{26A0} {} issue(s) found:", issues.len());
    println!();
    for (i, issue) in issues.iter().enumerate() {
        println!("  {}. {}", i + 1, issue);
    }
    println!();
}
