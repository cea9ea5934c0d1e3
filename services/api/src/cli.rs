use crate::demo::{run_capacity_report, run_demo, CapacityArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use headcount::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Headcount Governance",
    about = "Run the headcount governance service or inspect department capacity",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the capacity ledger of every seeded department
    Capacity(CapacityArgs),
    /// Walk through a request, approval and hiring scenario on the demo seed
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Master-data seed to load at startup (overrides HEADCOUNT_SEED_FILE)
    #[arg(long)]
    pub(crate) seed: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Capacity(args) => run_capacity_report(args),
        Command::Demo(args) => run_demo(args),
    }
}
