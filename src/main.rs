//! `roster-mailer`: operator CLI for roster import, enqueue, processing, and status.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use roster_mailer::builders::MailerBuilder;
use roster_mailer::config::MailerConfig;
use roster_mailer::core::TemplateId;
use roster_mailer::infra::store::RecordFilter;
use roster_mailer::runtime::TokioSpawner;
use roster_mailer::util::{init_tracing, DEFAULT_LOG_DIRECTIVE};

#[derive(Parser, Debug)]
#[command(name = "roster-mailer")]
#[command(version)]
#[command(about = "Batched, deduplicated roster email queue")]
#[command(propagate_version = true)]
struct Args {
    /// JSON configuration file; defaults come from MAILER_* / SMTP_* variables otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Send through SMTP instead of writing previews
    #[arg(long, global = true, conflicts_with = "preview")]
    live: bool,

    /// Write previews instead of sending
    #[arg(long, global = true)]
    preview: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge a roster export and welcome new members
    Import {
        /// Roster CSV with a header row, or a JSON array of row objects
        rows: PathBuf,
    },

    /// Queue a template for matching roster records, then process
    Enqueue {
        /// Template identifier
        #[arg(long)]
        template: TemplateId,

        /// Record filter as a JSON object, e.g. '{"is_a_worker": true}'
        #[arg(long)]
        filter: Option<String>,
    },

    /// Process every pending email now
    Process,

    /// Print ledger entry counts per status
    Status,
}

fn load_config(args: &Args) -> Result<MailerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            MailerConfig::from_json_str(&raw).map_err(anyhow::Error::msg)?
        }
        None => MailerConfig::from_env().map_err(anyhow::Error::msg)?,
    };
    if args.live {
        config.preview_mode = false;
    } else if args.preview {
        config.preview_mode = true;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_LOG_DIRECTIVE);
    let args = Args::parse();
    let config = load_config(&args)?;

    let mailer = MailerBuilder::new(config)
        .build(TokioSpawner::current())
        .context("assembling mailer")?;
    mailer.ensure_ledger().await.context("preparing ledger")?;

    match args.command {
        Commands::Import { rows } => {
            let outcome = mailer
                .import_roster_file(&rows)
                .with_context(|| format!("importing roster {}", rows.display()))?;
            mailer.drain().await;
            println!(
                "created {} updated {} unchanged {} total {}",
                outcome.created.len(),
                outcome.updated,
                outcome.unchanged,
                outcome.total
            );
        }
        Commands::Enqueue { template, filter } => {
            let filter = match filter {
                Some(raw) => {
                    let value: Value = serde_json::from_str(&raw).context("parsing --filter")?;
                    RecordFilter::from_json(&value)?
                }
                None => RecordFilter::new(),
            };
            let count = mailer.enqueue(&filter, template).await?;
            mailer.drain().await;
            println!("queued {count}");
        }
        Commands::Process => {
            let report = mailer.process_pending().await?;
            println!(
                "scanned {} sent {} previewed {} failed {}",
                report.scanned, report.sent, report.previewed, report.failed
            );
        }
        Commands::Status => {
            let summary = mailer.ledger_summary().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    info!("done");
    Ok(())
}
