pub mod project;
pub mod schema;
pub mod today;
pub mod validate;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Args;
use fincast::core::{date_resolver, read_model_json, Interval, Model, RunConfig};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Model and reporting interval shared by the projecting commands
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Model JSON file. Reads from stdin if "-".
    #[arg(short, long, default_value = "-")]
    model: PathBuf,

    /// First date of the report; any date expression, e.g. "2020-01-01" or "retire-1y"
    #[arg(long)]
    start: String,

    /// Date the report stops before
    #[arg(long)]
    end: String,

    /// Date of the "today" snapshot; defaults to the current date
    #[arg(long)]
    today: Option<String>,
}

impl RunArgs {
    pub fn load(&self) -> anyhow::Result<(Model, RunConfig)> {
        let model = read_model(&self.model)?;
        let resolver = date_resolver(&model);
        let resolve = |flag: &str, expr: &str| -> anyhow::Result<NaiveDate> {
            resolver
                .resolve(expr)
                .with_context(|| format!("cannot resolve --{flag} {expr:?}"))
        };
        let start = resolve("start", &self.start)?;
        let end = resolve("end", &self.end)?;
        if end <= start {
            anyhow::bail!("--end {} is not after --start {}", end, start);
        }
        let today = match &self.today {
            Some(expr) => resolve("today", expr)?,
            None => chrono::Local::now().date_naive(),
        };
        log::debug!("Interval {} to {}, today {}", start, end, today);
        let config = RunConfig {
            interval: Interval::new(start, end),
            today,
        };
        Ok((model, config))
    }
}

/// Read a model from a JSON file (or stdin with "-")
pub fn read_model(path: &Path) -> anyhow::Result<Model> {
    if path.as_os_str() == "-" {
        read_from_stdin()
    } else {
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        Ok(read_model_json(BufReader::new(file))?)
    }
}

fn read_from_stdin() -> anyhow::Result<Model> {
    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin.lock());

    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;

    if buffer.is_empty() {
        anyhow::bail!("No input received. Provide a model file or pipe one to stdin.");
    }

    Ok(read_model_json(io::Cursor::new(buffer))?)
}
