//! # Docshelf CLI (`shelf`)
//!
//! The `shelf` binary drives the document catalog from the command line.
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/docshelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf init` | Scaffold a config file, or prepare the remote store layout |
//! | `shelf list` | List the catalog in canonical order |
//! | `shelf upload <file>` | Upload a file through the enrichment pipeline |
//! | `shelf delete <id>` | Delete a document's blob, metadata, and index entry |

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};

use docshelf::config::{load_config, save_config, AccountConfig, Config, StoreConfig};
use docshelf::enrich::Stage;
use docshelf::index::DocStatus;
use docshelf::store::http::HttpStore;
use docshelf::store::ObjectStore;
use docshelf::summarize::create_summarizer;
use docshelf::upload::{
    AutoConfirm, ConfirmGate, DeleteOutcome, FileInput, Progress, UploadCoordinator, UploadForm,
    UploadOutcome,
};

/// Docshelf — a document catalog over a remote content store.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docshelf.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Docshelf — a document catalog over a remote content store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docshelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold a config file, or prepare the remote store layout.
    ///
    /// When the config file does not exist, writes a template to fill in.
    /// When it does, creates the `docs/` and `meta/` placeholders in the
    /// remote store. Idempotent either way.
    Init,

    /// List the catalog in canonical order (newest first).
    List,

    /// Upload a file through the enrichment pipeline.
    ///
    /// Extracts text, summarizes it when a summarizer credential is
    /// configured, uploads the blob and metadata, and updates the index.
    /// A file whose name matches an existing entry replaces that entry,
    /// after a confirmation prompt; fresh uploads run without one.
    Upload {
        /// Path of the file to upload.
        file: PathBuf,

        /// Catalog title. Defaults to the filename without its extension.
        #[arg(long)]
        title: Option<String>,

        /// Free-form description.
        #[arg(long, default_value = "")]
        description: String,

        /// Category label.
        #[arg(long, default_value = "")]
        category: String,

        /// Extra metadata text (searchable).
        #[arg(long, default_value = "")]
        meta: String,

        /// Review status: draft, under-review, approved, final, archived.
        #[arg(long, default_value = "draft", value_parser = parse_status)]
        status: DocStatus,

        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// Delete a document: blob, metadata sidecar, and index entry.
    Delete {
        /// Document id (slug), as shown by `shelf list`.
        id: String,

        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

fn parse_status(s: &str) -> Result<DocStatus, String> {
    s.parse().map_err(|e| format!("{}", e))
}

/// Interactive confirmation on the controlling terminal. Declines when
/// stdin is not a terminal, so piped invocations never hang on a prompt.
struct StdinGate;

#[async_trait]
impl ConfirmGate for StdinGate {
    async fn confirm(&self, message: &str) -> bool {
        if !atty::is(atty::Stream::Stdin) {
            eprintln!("{} (declined: stdin is not a terminal, pass --yes)", message);
            return false;
        }
        eprint!("{} [y/N] ", message);
        let _ = std::io::stderr().flush();
        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;
        match answer {
            Ok(Ok(line)) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }
}

fn build_coordinator(config: &Config, assume_yes: bool) -> anyhow::Result<UploadCoordinator> {
    let timeout = Duration::from_secs(config.store.timeout_secs);
    let retry = config.store.retry_policy();
    let store: Arc<dyn ObjectStore> = Arc::new(HttpStore::new(
        &config.store.base_url,
        &config.store.credential()?,
        retry,
        timeout,
    )?);
    let summarizer = create_summarizer(&config.summarizer, retry, timeout)?;
    let gate: Arc<dyn ConfirmGate> = if assume_yes {
        Arc::new(AutoConfirm(true))
    } else {
        Arc::new(StdinGate)
    };
    Ok(UploadCoordinator::new(
        store,
        summarizer,
        gate,
        &config.store.base_path(),
        config.summarizer.max_excerpt_chars,
    ))
}

fn template_config() -> Config {
    Config {
        account: AccountConfig {
            username: "your-username".to_string(),
        },
        store: StoreConfig {
            base_url: "https://store.example.com".to_string(),
            owner: "your-org".to_string(),
            name: "your-catalog".to_string(),
            path: String::new(),
            credential: String::new(),
            max_attempts: 3,
            retry_base_ms: 500,
            timeout_secs: 30,
        },
        summarizer: Default::default(),
    }
}

async fn run_init(config_path: &PathBuf) -> anyhow::Result<()> {
    if !config_path.exists() {
        save_config(config_path, &template_config())?;
        println!(
            "Wrote a config template to {}. Fill in the store settings, then run `shelf init` again.",
            config_path.display()
        );
        return Ok(());
    }
    let config = load_config(config_path)?;
    let coordinator = build_coordinator(&config, true)?;
    coordinator.ensure_layout().await?;
    println!("Remote store layout is ready.");
    Ok(())
}

async fn run_list(config: &Config) -> anyhow::Result<()> {
    let coordinator = build_coordinator(config, true)?;
    coordinator.hydrate().await?;
    let documents = coordinator.documents().get();
    if documents.is_empty() {
        println!("The catalog is empty.");
        return Ok(());
    }
    println!("{:<28} {:<14} {:<12} TITLE", "ID", "STATUS", "UPDATED");
    for doc in documents {
        println!(
            "{:<28} {:<14} {:<12} {}",
            doc.id,
            doc.status.to_string(),
            doc.last_updated.format("%Y-%m-%d"),
            doc.title
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_upload(
    config: &Config,
    file: &PathBuf,
    title: Option<String>,
    description: String,
    category: String,
    meta: String,
    status: DocStatus,
    yes: bool,
) -> anyhow::Result<()> {
    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("file path has no usable filename")?
        .to_string();

    let coordinator = build_coordinator(config, yes)?;
    coordinator.hydrate().await?;

    // Stage and progress go to stderr so stdout stays parseable.
    let show_progress = atty::is(atty::Stream::Stderr);
    let _stage_sub = coordinator.stage().subscribe(move |stage: &Stage| {
        if show_progress && *stage != Stage::Idle {
            eprintln!("[{}]", stage);
        }
    });
    let _progress_sub = coordinator.progress().subscribe(move |p: &Progress| {
        if show_progress && p.total > 0 {
            eprintln!("  {} / {} bytes", p.transferred, p.total);
        }
    });

    let form = UploadForm::new();
    form.file.set(Some(FileInput { name, bytes }));
    if let Some(title) = title {
        form.title.set(title);
    }
    form.description.set(description);
    form.category.set(category);
    form.meta.set(meta);
    form.status.set(status);

    let outcome = coordinator.submit(&form).await?;
    form.teardown();
    match outcome {
        UploadOutcome::Completed(doc) => {
            println!("Stored {} as {} ({})", doc.filename, doc.id, doc.status);
            if !doc.summary.is_empty() {
                println!("Summary: {}", doc.summary);
            }
        }
        UploadOutcome::Declined => println!("Upload declined; nothing was written."),
        UploadOutcome::AlreadyRunning => println!("Another workflow is already running."),
    }
    Ok(())
}

async fn run_delete(config: &Config, id: &str, yes: bool) -> anyhow::Result<()> {
    let coordinator = build_coordinator(config, yes)?;
    coordinator.hydrate().await?;
    match coordinator.delete(id).await? {
        DeleteOutcome::Completed => println!("Deleted {}.", id),
        DeleteOutcome::Declined => println!("Delete declined; nothing was removed."),
        DeleteOutcome::AlreadyRunning => println!("Another workflow is already running."),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        return run_init(&cli.config).await;
    }

    let config = load_config(&cli.config)?;
    match cli.command {
        Commands::Init => unreachable!(),
        Commands::List => run_list(&config).await?,
        Commands::Upload {
            file,
            title,
            description,
            category,
            meta,
            status,
            yes,
        } => {
            run_upload(
                &config,
                &file,
                title,
                description,
                category,
                meta,
                status,
                yes,
            )
            .await?;
        }
        Commands::Delete { id, yes } => run_delete(&config, &id, yes).await?,
    }

    Ok(())
}
