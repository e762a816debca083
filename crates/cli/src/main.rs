//! ICA CLI - Main entry point

use clap::{Parser, Subcommand};
use ica_cli::{commands, AppConfig, AppContext};
use ica_core::{DeclarationId, RequestMeta};
use ica_numbering::Sequence;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ica")]
#[command(about = "ICA - Municipal industry and commerce tax declarations", long_about = None)]
struct Cli {
    /// Config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path (overrides config and ICA_DATABASE)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Requester IP recorded in the audit log
    #[arg(long, global = true)]
    ip: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Create a draft declaration
    Create {
        /// Owner (submitting user) ID
        #[arg(long)]
        owner: String,
        /// Municipality code
        #[arg(long)]
        municipality: String,
        /// Tax year being declared
        #[arg(long)]
        year: i32,
    },

    /// Replace sections of a draft from a JSON file
    Update {
        id: DeclarationId,
        #[arg(long)]
        actor: String,
        /// JSON with any of: taxpayer, income_base, activities,
        /// energy_generation, settlement, payment, discounts
        #[arg(long)]
        file: PathBuf,
    },

    /// Run the calculation and store the result
    Calculate {
        id: DeclarationId,
        #[arg(long)]
        actor: String,
    },

    /// Sign a draft
    Sign {
        id: DeclarationId,
        #[arg(long)]
        actor: String,
        /// Signature data (JSON)
        #[arg(long)]
        file: PathBuf,
    },

    /// Create the correction of a signed declaration
    Correct {
        id: DeclarationId,
        #[arg(long)]
        actor: String,
    },

    /// Void a draft
    Void {
        id: DeclarationId,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        reason: String,
    },

    /// Verify the document hash and seal of a signed declaration
    Verify { id: DeclarationId },

    /// Show a declaration
    Show {
        id: DeclarationId,
        /// Include every section
        #[arg(long)]
        sections: bool,
    },

    /// List declarations of an owner
    List {
        #[arg(long)]
        owner: String,
    },

    /// Manage numbering counters
    Counter {
        #[command(subcommand)]
        command: CounterCommands,
    },

    /// Generate a new system key
    Keygen {
        /// Output file path
        #[arg(long, default_value = "system.key")]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum CounterCommands {
    /// Create or reset a counter
    Set {
        municipality: String,
        /// consecutivo or radicado
        sequence: Sequence,
        #[arg(long, default_value = "")]
        prefix: String,
        #[arg(long, default_value = "1")]
        start: u64,
        #[arg(long)]
        width: Option<u32>,
    },

    /// Show a counter without advancing it
    Show {
        municipality: String,
        sequence: Sequence,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Keygen { output } = &cli.command {
        return commands::keygen(output);
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }
    if let Commands::Init = cli.command {
        return commands::init(&config);
    }
    let ctx = AppContext::new(config)?;

    let request = RequestMeta {
        ip_address: cli.ip,
        user_agent: Some(format!("ica-cli/{}", env!("CARGO_PKG_VERSION"))),
    };

    match cli.command {
        Commands::Create {
            owner,
            municipality,
            year,
        } => commands::create(&ctx, &owner, &municipality, year, &request)?,

        Commands::Update { id, actor, file } => {
            commands::update(&ctx, id, &actor, &file, &request)?
        }

        Commands::Calculate { id, actor } => commands::calculate(&ctx, id, &actor, &request)?,

        Commands::Sign { id, actor, file } => commands::sign(&ctx, id, &actor, &file, &request)?,

        Commands::Correct { id, actor } => commands::correct(&ctx, id, &actor, &request)?,

        Commands::Void { id, actor, reason } => {
            commands::void(&ctx, id, &actor, &reason, &request)?
        }

        Commands::Verify { id } => commands::verify(&ctx, id)?,

        Commands::Show { id, sections } => commands::show(&ctx, id, sections)?,

        Commands::List { owner } => commands::list(&ctx, &owner)?,

        Commands::Counter { command } => match command {
            CounterCommands::Set {
                municipality,
                sequence,
                prefix,
                start,
                width,
            } => commands::counter_set(&ctx, &municipality, sequence, &prefix, start, width)?,
            CounterCommands::Show {
                municipality,
                sequence,
            } => commands::counter_show(&ctx, &municipality, sequence)?,
        },

        Commands::Init | Commands::Keygen { .. } => {}
    }

    Ok(())
}
