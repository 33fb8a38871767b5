use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "timeblock", version, about = "Time-block planner")]
struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daily plan generation and live rescheduling
    Plan {
        #[command(subcommand)]
        action: commands::plan::PlanAction,
    },
    /// Task management
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Goal management
    Goal {
        #[command(subcommand)]
        action: commands::goal::GoalAction,
    },
    /// Scheduling constraints
    Constraint {
        #[command(subcommand)]
        action: commands::constraint::ConstraintAction,
    },
    /// Planned vs actual feedback
    Feedback {
        #[command(subcommand)]
        action: commands::feedback::FeedbackAction,
    },
    /// Energy curve
    Energy {
        #[command(subcommand)]
        action: commands::energy::EnergyAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("TIMEBLOCK_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let json = cli.json;
    let result = match cli.command {
        Commands::Plan { action } => commands::plan::run(action, json),
        Commands::Task { action } => commands::task::run(action, json),
        Commands::Goal { action } => commands::goal::run(action, json),
        Commands::Constraint { action } => commands::constraint::run(action, json),
        Commands::Feedback { action } => commands::feedback::run(action, json),
        Commands::Energy { action } => commands::energy::run(action, json),
        Commands::Config { action } => commands::config::run(action, json),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
