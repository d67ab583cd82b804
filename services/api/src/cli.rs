use crate::demo::{run_demo, run_sweep, DemoArgs, SweepArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use vetting::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Candidate Vetting Service",
    about = "Run and demonstrate the background check lifecycle engine from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service and sweep scheduler (default command)
    Serve(ServeArgs),
    /// Run one escalation, SLA, and reminder pass over seeded sample checks
    Sweep(SweepArgs),
    /// Walk a sample candidate through the full lifecycle on a simulated clock
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
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Sweep(args) => run_sweep(args),
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["vetting-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn sweep_accepts_a_reference_date() {
        let cli = Cli::try_parse_from(["vetting-api", "sweep", "--today", "2026-10-16"])
            .expect("parses");
        match cli.command {
            Some(Command::Sweep(args)) => {
                assert_eq!(args.today.map(|date| date.to_string()).as_deref(), Some("2026-10-16"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn malformed_dates_are_rejected() {
        assert!(Cli::try_parse_from(["vetting-api", "demo", "--start", "16/10/2026"]).is_err());
    }
}
