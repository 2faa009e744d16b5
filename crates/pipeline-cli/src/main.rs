use clap::{Parser, Subcommand};
use pipeline_cli::cmd::{self, config::ConfigSubcommand, transition::TransitionCommand};
use pipeline_cli::root;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pipeline",
    about = "Change item pipeline ledger: assign, move and audit work items",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .pipeline/)
    #[arg(long, global = true, env = "PIPELINE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a pipeline ledger in the current project
    Init,

    #[command(flatten)]
    Transition(TransitionCommand),

    /// Show one change item
    Show { item_type: String, item_number: String },

    /// List every change item
    List {
        /// Selector expression, e.g. '{"selector":{"class":"changepipeline.change-item"}}'
        #[arg(long)]
        selector: Option<String>,
    },

    /// Show every committed version of one change item
    History { item_type: String, item_number: String },

    /// Call a ledger function by name and print the raw result
    Invoke {
        function: String,
        args: Vec<String>,
    },

    /// Inspect and validate the project config
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Serve the ledger over HTTP
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "3141")]
        port: u16,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Transition(transition) => cmd::transition::run(&root, transition, cli.json),
        Commands::Show {
            item_type,
            item_number,
        } => cmd::show::run(&root, &item_type, &item_number, cli.json),
        Commands::List { selector } => cmd::list::run(&root, selector.as_deref(), cli.json),
        Commands::History {
            item_type,
            item_number,
        } => cmd::history::run(&root, &item_type, &item_number, cli.json),
        Commands::Invoke { function, args } => cmd::invoke::run(&root, &function, &args),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Serve { port } => cmd::serve::run(&root, port),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
