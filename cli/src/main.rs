//! Cellar CLI — create containers, submit winery operations, and inspect
//! lineage against an in-memory ledger store.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod config;
mod container;
mod group;
mod op;
mod store;

use config::CellarConfig;
use container::ContainerTypeArg;
use op::OperationTypeArg;

#[derive(Parser)]
#[command(name = "cellar")]
#[command(about = "Winery vessel ledger — containers, operations, and lineage", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding the store's seed/dump file
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Tenant id to operate as (defaults to a stable per-data-dir id)
    #[arg(short, long)]
    tenant: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Container lifecycle and inspection
    Container {
        #[command(subcommand)]
        command: ContainerCommands,
    },

    /// Submit a winery operation
    Op {
        /// Which operation to build
        #[arg(value_enum)]
        op_type: OperationTypeArg,

        /// JSON operation request file (reads stdin if omitted)
        #[arg(long)]
        request: Option<PathBuf>,
    },

    /// Barrel-group membership administration
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },
}

#[derive(Subcommand)]
enum ContainerCommands {
    /// Create a new container
    Create {
        #[arg(short, long)]
        name: String,

        #[arg(short = 'T', long, value_enum)]
        container_type: ContainerTypeArg,

        #[arg(short, long)]
        capacity: Option<i64>,
    },

    /// Show a container and its current head state
    Show { id: String },

    /// Show a container's full state history
    History { id: String },
}

#[derive(Subcommand)]
enum GroupCommands {
    /// Replace a barrel-group's live membership
    SetMembers {
        group_id: String,
        #[arg(required = true)]
        barrel_ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = CellarConfig::new(cli.data_dir.clone(), cli.tenant.clone())?;

    if cli.verbose {
        println!("{} {}", "Data dir:".bright_cyan(), config.data_dir.display());
        println!("{} {}", "Tenant:".bright_cyan(), config.tenant_id);
    }

    let repo = store::load(&config).await?;

    match cli.command {
        Commands::Container { command } => match command {
            ContainerCommands::Create { name, container_type, capacity } => {
                container::create(&repo, config.tenant_id, name, container_type, capacity).await?;
            }
            ContainerCommands::Show { id } => {
                container::show(&repo, container::parse_container_id(&id)?).await?;
            }
            ContainerCommands::History { id } => {
                container::history(&repo, container::parse_container_id(&id)?).await?;
            }
        },
        Commands::Op { op_type, request } => {
            op::submit(&repo, config.tenant_id, op_type, request).await?;
        }
        Commands::Group { command } => match command {
            GroupCommands::SetMembers { group_id, barrel_ids } => {
                let group_id = container::parse_container_id(&group_id)?;
                let members = barrel_ids
                    .iter()
                    .map(|id| container::parse_container_id(id))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                group::set_members(&repo, group_id, members).await?;
            }
        },
    }

    store::save(&repo, &config).await?;
    Ok(())
}
