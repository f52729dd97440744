//! Project command - replay the model and print the evaluation ledger

use super::RunArgs;
use clap::Args;
use fincast::core::{digest, run, write_csv, Evaluation, Projection};
use std::io;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct ProjectCommand {
    #[command(flatten)]
    run: RunArgs,

    /// Only show items whose name contains this text
    #[arg(short, long)]
    item: Option<String>,

    /// Output as CSV instead of formatted table
    #[arg(long, conflicts_with = "json")]
    csv: bool,

    /// Output ledger, snapshot and warnings as JSON
    #[arg(long)]
    json: bool,

    /// Print only the SHA-256 of the CSV ledger
    #[arg(long, conflicts_with_all = ["csv", "json"])]
    digest: bool,
}

#[derive(Debug, Clone, Tabled)]
struct LedgerRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Item")]
    item: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl ProjectCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let (model, config) = self.run.load()?;
        let mut projection = run(&model, &config);
        if let Some(filter) = &self.item {
            projection
                .evaluations
                .retain(|e| e.name.contains(filter.as_str()));
        }

        if self.digest {
            println!("{}", digest(&projection.evaluations)?);
        } else if self.csv {
            write_csv(&projection.evaluations, io::stdout())?;
        } else if self.json {
            println!("{}", serde_json::to_string_pretty(&projection)?);
        } else {
            print_table(&projection.evaluations);
        }
        print_warnings(&projection);
        Ok(())
    }
}

fn print_table(evaluations: &[Evaluation]) {
    if evaluations.is_empty() {
        println!("No evaluations in the interval");
        return;
    }
    let rows: Vec<LedgerRow> = evaluations
        .iter()
        .map(|e| LedgerRow {
            date: e.date.format("%Y-%m-%d").to_string(),
            item: e.name.clone(),
            value: format!("{:.*}", e.precision as usize, e.display_value()),
        })
        .collect();
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{}", table);
}

/// Warnings go to stderr so ledger output stays machine-readable.
pub fn print_warnings(projection: &Projection) {
    if projection.warnings.is_empty() {
        return;
    }
    eprintln!("\u{26A0} {} warning(s):", projection.warnings.len());
    for warning in &projection.warnings {
        eprintln!("  {}", warning);
    }
}
