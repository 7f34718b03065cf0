//! Atlas catalog scanner
//!
//! Registers data sources from `config.toml`, walks them and keeps a
//! per-tenant metadata catalog in sync with what it finds.

use anyhow::Result;
use atlas_db::DEFAULT_SEARCH_LIMIT;
use atlas_logging::{init_logging, LogConfig};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;
mod config;

#[derive(Parser, Debug)]
#[command(name = "atlas", about = "Scan data sources into the Atlas metadata catalog")]
struct Cli {
    /// Verbose console logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (defaults to $ATLAS_HOME/config.toml)
    #[arg(long, global = true, env = "ATLAS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan one resource, optionally only the named namespaces or object paths
    Scan {
        tenant: i64,
        resource: i64,
        namespaces: Vec<String>,
        /// Caller credential forwarded to the resource directory
        #[arg(long, env = "ATLAS_TOKEN")]
        token: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Refresh a single table of an already cataloged schema or database
    ScanTable {
        tenant: i64,
        resource: i64,
        schema: String,
        table: String,
        #[arg(long, env = "ATLAS_TOKEN")]
        token: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Scan every namespace of a tenant that has not been scanned yet
    ScanUnscanned {
        tenant: i64,
        #[arg(long)]
        json: bool,
    },

    /// Show the cataloged hierarchy of a tenant
    Tree {
        tenant: i64,
        #[arg(long)]
        json: bool,
    },

    /// Show recent scan runs, or one run with --id
    Runs {
        tenant: i64,
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long)]
        json: bool,
    },

    /// Per-resource scan coverage
    Resources {
        tenant: i64,
        #[arg(long)]
        json: bool,
    },

    /// Find cataloged tables or fields by name or comment
    Search {
        tenant: i64,
        #[arg(value_enum)]
        target: SearchTarget,
        keyword: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: u32,
        #[arg(long)]
        json: bool,
    },

    /// Catalog totals for a tenant
    Stats {
        tenant: i64,
        #[arg(long)]
        json: bool,
    },

    /// List what a source holds right now without touching the catalog
    Browse {
        tenant: i64,
        resource: i64,
        /// Object path (`bucket[/prefix]`); omit to list namespaces
        path: Option<String>,
        #[arg(long, env = "ATLAS_TOKEN")]
        token: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SearchTarget {
    Tables,
    Fields,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Write a starter config
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Print the effective config with credentials removed
    Show {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "atlas",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let config = cli.config.unwrap_or_else(config::default_config_path);

    match cli.command {
        Commands::Scan {
            tenant,
            resource,
            namespaces,
            token,
            json,
        } => cli::scan::run(cli::scan::ScanArgs {
            config,
            tenant,
            resource,
            namespaces,
            token,
            json,
        }),

        Commands::ScanTable {
            tenant,
            resource,
            schema,
            table,
            token,
            json,
        } => cli::scan::run_table(cli::scan::ScanTableArgs {
            config,
            tenant,
            resource,
            schema,
            table,
            token,
            json,
        }),

        Commands::ScanUnscanned { tenant, json } => {
            cli::scan::run_unscanned(cli::scan::ScanUnscannedArgs {
                config,
                tenant,
                json,
            })
        }

        Commands::Tree { tenant, json } => cli::catalog::run_tree(cli::catalog::TreeArgs {
            config,
            tenant,
            json,
        }),

        Commands::Runs {
            tenant,
            id,
            limit,
            json,
        } => cli::catalog::run_runs(cli::catalog::RunsArgs {
            config,
            tenant,
            id,
            limit,
            json,
        }),

        Commands::Resources { tenant, json } => {
            cli::catalog::run_resources(cli::catalog::ResourcesArgs {
                config,
                tenant,
                json,
            })
        }

        Commands::Search {
            tenant,
            target,
            keyword,
            limit,
            json,
        } => cli::search::run_search(cli::search::SearchArgs {
            config,
            tenant,
            target: match target {
                SearchTarget::Tables => cli::search::SearchTarget::Tables,
                SearchTarget::Fields => cli::search::SearchTarget::Fields,
            },
            keyword,
            limit,
            json,
        }),

        Commands::Stats { tenant, json } => cli::search::run_stats(cli::search::StatsArgs {
            config,
            tenant,
            json,
        }),

        Commands::Browse {
            tenant,
            resource,
            path,
            token,
            json,
        } => cli::browse::run(cli::browse::BrowseArgs {
            config,
            tenant,
            resource,
            path,
            token,
            json,
        }),

        Commands::Config { action } => cli::config::run(cli::config::ConfigArgs {
            config,
            action: match action {
                ConfigCommands::Init { force } => cli::config::ConfigAction::Init { force },
                ConfigCommands::Show { json } => cli::config::ConfigAction::Show { json },
            },
        }),
    }
}
