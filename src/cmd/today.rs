//! Today command - values of every started item as of the snapshot date

use super::project::print_warnings;
use super::RunArgs;
use clap::Args;
use fincast::core::run;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct TodayCommand {
    #[command(flatten)]
    run: RunArgs,

    /// Output as JSON instead of formatted tables
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Tabled)]
struct ValueRow {
    #[tabled(rename = "Item")]
    item: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl TodayCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let (model, config) = self.run.load()?;
        let projection = run(&model, &config);
        let today = &projection.today;

        if self.json {
            println!("{}", serde_json::to_string_pretty(today)?);
        } else {
            println!();
            println!("AS OF {}", config.today.format("%Y-%m-%d"));
            print_section("Assets", &today.assets);
            print_section("Debts", &today.debts);
            print_section("Incomes", &today.incomes);
            print_section("Expenses", &today.expenses);
            print_section("Settings", &today.settings);
        }
        print_warnings(&projection);
        Ok(())
    }
}

fn print_section(title: &str, values: &BTreeMap<String, Decimal>) {
    println!();
    println!("{}", title.to_uppercase());
    if values.is_empty() {
        println!("  (none)");
        return;
    }
    let rows: Vec<ValueRow> = values
        .iter()
        .map(|(item, value)| ValueRow {
            item: item.clone(),
            value: format!("{:.2}", value),
        })
        .collect();
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{}", table);
}
