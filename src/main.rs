use clap::{Parser, Subcommand};

mod cmd;

#[derive(Parser, Debug)]
#[command(name = "fincast", version, about = "Project personal finances with UK tax settlement")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay the model and print the evaluation ledger
    Project(cmd::project::ProjectCommand),
    /// Show asset, debt, income, expense and setting values as of today
    Today(cmd::today::TodayCommand),
    /// Check that every date and amount in the model resolves
    Validate(cmd::validate::ValidateCommand),
    /// Print the JSON Schema of the model format
    Schema(cmd::schema::SchemaCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Project(project) => project.exec(),
        Command::Today(today) => today.exec(),
        Command::Validate(validate) => validate.exec(),
        Command::Schema(schema) => schema.exec(),
    }
}
