//! tablerag CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use serde::Serialize;
use std::path::PathBuf;
use tablerag::{
    commands::{
        cmd_delete_table, cmd_fused, cmd_highlight, cmd_ingest, cmd_init, cmd_job,
        cmd_list_tables, cmd_query, cmd_rank, cmd_reindex, cmd_rename_table, cmd_resume,
        cmd_show_table, cmd_worker, print_fused_result, print_highlight, print_init, print_job,
        print_query_result, print_rank_response, print_slice, print_tables,
    },
    config::Config,
    error::{Error, Result},
    meta::Job,
    progress::LogWriterFactory,
    rank::numeric::SortDirection,
    retrieval::RankRequest,
    Services,
};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tablerag")]
#[command(version, about = "Ask questions of CSV tables with row-level citations", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize tablerag configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Upload a CSV file as a new table
    Ingest {
        /// Path to the CSV file
        file: PathBuf,

        /// Table name (defaults to the file name without extension)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show a job's status
    Job {
        job_id: String,
    },

    /// Resume an interrupted ingestion job
    Resume {
        job_id: String,
    },

    /// Re-embed every row of a table
    Reindex {
        table_id: String,
    },

    /// Ask a question about a table
    Query {
        /// The question
        query: String,

        /// Table id, or "latest"
        #[arg(short, long, default_value = "latest")]
        table: String,

        /// Maximum number of cited rows
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,

        /// Show the raw fused vector/lexical ranking instead of an answer
        #[arg(long)]
        fused: bool,
    },

    /// Rank rows by a numeric column
    Rank {
        /// Column to rank by
        #[arg(long)]
        primary_col: String,

        #[arg(long, value_enum, default_value = "desc")]
        primary_dir: SortDirection,

        /// Column breaking ties on the primary value
        #[arg(long)]
        tie_col: Option<String>,

        #[arg(long, value_enum, default_value = "asc")]
        tie_dir: SortDirection,

        /// Number of rows to return
        #[arg(short, long, default_value = "1")]
        limit: usize,

        /// Table id, or "latest"
        #[arg(short, long, default_value = "latest")]
        table: String,
    },

    /// Manage uploaded tables
    Tables {
        #[command(subcommand)]
        action: TablesAction,
    },

    /// Show a recorded highlight
    Highlight {
        highlight_id: String,
    },

    /// Resume interrupted jobs and process reindex requests until Ctrl-C
    Worker,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum TablesAction {
    /// List tables, newest first
    List,

    /// Print a window of rows
    Show {
        /// Table id, or "latest"
        #[arg(default_value = "latest")]
        table: String,

        #[arg(long, default_value = "0")]
        offset: i64,

        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Only these columns (comma-separated)
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
    },

    /// Rename a table
    Rename {
        table_id: String,
        name: String,
    },

    /// Delete a table with its rows, vectors, jobs and highlights
    Delete {
        table_id: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    match cli.command {
        Commands::Init { force } => {
            let base_dir = cli
                .config
                .as_deref()
                .and_then(|p| p.parent())
                .map(PathBuf::from);
            let config = cmd_init(base_dir, force).await?;
            if cli.json {
                print_json(&serde_json::json!({
                    "config_file": config.paths.config_file,
                    "db_file": config.paths.db_file,
                }))?;
            } else {
                print_init(&config);
            }
            return Ok(());
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "tablerag", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;
    let services = Services::connect(config).await?;
    let show_progress = !cli.json;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Ingest { file, name } => {
            let job = cmd_ingest(&services, &file, name.as_deref(), show_progress).await?;
            report_job(&job, cli.json)?;
        }

        Commands::Job { job_id } => {
            let job = cmd_job(&services.db, &job_id).await?;
            report_job(&job, cli.json)?;
        }

        Commands::Resume { job_id } => {
            let job = cmd_resume(&services, &job_id, show_progress).await?;
            report_job(&job, cli.json)?;
        }

        Commands::Reindex { table_id } => {
            let job = cmd_reindex(&services, &table_id, show_progress).await?;
            report_job(&job, cli.json)?;
        }

        Commands::Query {
            query,
            table,
            top_k,
            fused,
        } => {
            if fused {
                let result = cmd_fused(&services, &table, &query, top_k).await?;
                if cli.json {
                    print_json(&result)?;
                } else {
                    print_fused_result(&result);
                }
            } else {
                let result = cmd_query(&services, &table, &query, top_k).await?;
                if cli.json {
                    print_json(&result)?;
                } else {
                    print_query_result(&result);
                }
            }
        }

        Commands::Rank {
            primary_col,
            primary_dir,
            tie_col,
            tie_dir,
            limit,
            table,
        } => {
            let request = RankRequest {
                table,
                primary_col,
                primary_dir,
                tie_col,
                tie_dir,
                limit,
            };
            let response = cmd_rank(&services, &request).await?;
            if cli.json {
                print_json(&response)?;
            } else {
                print_rank_response(&response);
            }
        }

        Commands::Tables { action } => handle_tables(&services, action, cli.json).await?,

        Commands::Highlight { highlight_id } => {
            let view = cmd_highlight(&services, &highlight_id).await?;
            if cli.json {
                print_json(&view)?;
            } else {
                print_highlight(&view);
            }
        }

        Commands::Worker => {
            let report = cmd_worker(&services).await?;
            if !cli.json {
                println!(
                    "Worker stopped. Resumed {} job(s), abandoned {}.",
                    report.resumed.len(),
                    report.abandoned.len()
                );
            }
        }
    }

    Ok(())
}

async fn handle_tables(services: &Services, action: TablesAction, json: bool) -> Result<()> {
    match action {
        TablesAction::List => {
            let tables = cmd_list_tables(services).await?;
            if json {
                print_json(&tables)?;
            } else {
                print_tables(&tables);
            }
        }
        TablesAction::Show {
            table,
            offset,
            limit,
            columns,
        } => {
            let slice = cmd_show_table(services, &table, offset, limit, columns).await?;
            if json {
                print_json(&slice)?;
            } else {
                print_slice(&slice);
            }
        }
        TablesAction::Rename { table_id, name } => {
            let table = cmd_rename_table(services, &table_id, &name).await?;
            if json {
                print_json(&table)?;
            } else {
                println!("✓ Renamed {} to '{}'", table.id, table.name);
            }
        }
        TablesAction::Delete { table_id } => {
            cmd_delete_table(services, &table_id).await?;
            if json {
                print_json(&serde_json::json!({ "deleted": table_id }))?;
            } else {
                println!("✓ Deleted table {}", table_id);
            }
        }
    }
    Ok(())
}

fn report_job(job: &Job, json: bool) -> Result<()> {
    if json {
        print_json(job)
    } else {
        print_job(job);
        Ok(())
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}
