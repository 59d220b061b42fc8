use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use doc_validator::gateway::{FileGateway, HttpGateway};
use doc_validator::session::describe::describe_slot;
use doc_validator::session::{LocalFile, Session, SessionSnapshot, SlotRole, SlotStatus};
use doc_validator::validation::{
    build_view, categories, FindingsViewModel, Severity, SeverityFilter, ValidationOutcome,
};
use doc_validator::{Config, RunError};

/// Upload documents to a validation service and inspect the findings.
#[derive(Parser, Debug)]
#[command(name = "doc-validator", version, about)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Backend base URL, overrides the config file
    #[arg(long, global = true, env = "DOC_VALIDATOR_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the files the server already holds
    Files,
    /// Upload documents and run a validation
    Run {
        /// Input document; replaces the input already on the server
        #[arg(long)]
        input: Option<String>,
        /// Reference document (repeatable)
        #[arg(long = "reference")]
        references: Vec<String>,
        /// Validate against only the Nth reference (1-based)
        #[arg(long)]
        select: Option<usize>,
        /// Extra instructions for the validator
        #[arg(long, default_value = "")]
        instructions: String,
        /// Show only one severity: all, critical, warning or info
        #[arg(long, default_value = "all")]
        filter: SeverityFilter,
        /// Expand a category (repeatable)
        #[arg(long = "expand")]
        expand: Vec<String>,
        /// Expand every category
        #[arg(long)]
        expand_all: bool,
    },
    /// Remove a file from the server by remote path or file name
    Remove { target: String },
    /// Check that the backend is reachable
    Health,
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the JSON Schema of the config file
    Schema,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "doc_validator=debug" } else { "doc_validator=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let config = Config::load(cli.config.as_deref())
        .context("failed to load configuration")?
        .with_api_url(cli.api_url)
        .context("invalid --api-url")?;
    debug!(base_url = %config.api.base_url, "configuration resolved");

    match cli.command {
        Commands::Config { action } => {
            match action {
                ConfigAction::Show => {
                    print!("{}", config.to_toml().context("failed to render config")?)
                }
                ConfigAction::Schema => {
                    println!("{}", Config::json_schema().context("failed to render schema")?)
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Health => {
            let gateway = HttpGateway::new(&config.api).context("failed to build HTTP client")?;
            let status = gateway
                .health()
                .await
                .with_context(|| format!("backend at {} is unreachable", gateway.base_url()))?;
            println!("{}: {status}", gateway.base_url());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Files => {
            let session = connect(&config)?;
            session.hydrate().await.context("failed to load existing files")?;
            print_files(&session.snapshot());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Remove { target } => {
            let session = connect(&config)?;
            session.hydrate().await.context("failed to load existing files")?;
            let Some(id) = session.find_slot(&target) else {
                bail!("no file on the server matches '{target}'");
            };
            session.remove(&id)?.settled().await;
            if let Some(fault) = session.take_fault() {
                eprintln!("{fault}");
                return Ok(ExitCode::FAILURE);
            }
            println!("removed {target}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            input,
            references,
            select,
            instructions,
            filter,
            expand,
            expand_all,
        } => {
            let session = connect(&config)?;
            session.hydrate().await.context("failed to load existing files")?;
            upload_all(&session, input, references).await?;
            report_slots(&session.snapshot());

            if let Some(n) = select {
                let snapshot = session.snapshot();
                let Some(slot) = n.checked_sub(1).and_then(|i| snapshot.references.get(i)) else {
                    bail!(
                        "--select {n} is out of range ({} references)",
                        snapshot.references.len()
                    );
                };
                session.select_reference(&slot.id)?;
            }

            let result = match session.run_validation(&instructions).await {
                Ok(result) => result,
                Err(RunError::NotEligible(reason)) => {
                    eprintln!("cannot run validation: {reason}");
                    return Ok(ExitCode::FAILURE);
                }
                Err(err) => {
                    eprintln!("validation failed: {err}");
                    return Ok(ExitCode::FAILURE);
                }
            };

            println!("{}", result.summary_message);
            if result.outcome() == ValidationOutcome::Rejected {
                return Ok(ExitCode::FAILURE);
            }

            let expanded: HashSet<String> = if expand_all {
                categories(&result.findings).into_iter().collect()
            } else {
                expand.into_iter().collect()
            };
            print_findings(&build_view(&result.findings, filter, &expanded));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn connect(config: &Config) -> Result<Session> {
    let gateway = Arc::new(HttpGateway::new(&config.api).context("failed to build HTTP client")?);
    Ok(Session::new(
        gateway.clone(),
        gateway,
        config.session.reference_policy,
        config.session.accepted_extensions.clone(),
    ))
}

/// Read every file first so a bad path fails before anything is uploaded,
/// then upload them concurrently and wait for all of them to settle.
async fn upload_all(
    session: &Session,
    input: Option<String>,
    references: Vec<String>,
) -> Result<()> {
    let mut files = Vec::new();
    if let Some(path) = input {
        files.push((SlotRole::Input, LocalFile::read(&path).await?));
    }
    for path in references {
        files.push((SlotRole::Reference, LocalFile::read(&path).await?));
    }

    let mut pending = Vec::with_capacity(files.len());
    for (role, file) in files {
        pending.push(session.upload(role, file)?);
    }
    join_all(pending.into_iter().map(|p| p.settled())).await;
    Ok(())
}

fn print_files(snapshot: &SessionSnapshot) {
    println!("Input:");
    match &snapshot.input {
        Some(slot) => println!("  {}", describe_slot(slot)),
        None => println!("  (none)"),
    }
    println!("References:");
    if snapshot.references.is_empty() {
        println!("  (none)");
    }
    for (n, slot) in snapshot.references.iter().enumerate() {
        println!("  {}. {}", n + 1, describe_slot(slot));
    }
}

fn report_slots(snapshot: &SessionSnapshot) {
    let slots = snapshot.input.iter().chain(snapshot.references.iter());
    for slot in slots.filter(|slot| slot.status == SlotStatus::Error) {
        eprintln!("{} upload failed: {}", slot.role, describe_slot(slot));
    }
    if let Some(fault) = &snapshot.fault {
        eprintln!("{fault}");
    }
}

fn print_findings(view: &FindingsViewModel) {
    println!(
        "Critical: {}  Warning: {}  Info: {}",
        view.summary.count(Severity::Critical),
        view.summary.count(Severity::Warning),
        view.summary.count(Severity::Info)
    );

    for group in &view.categories {
        let marker = if group.expanded { "-" } else { "+" };
        println!("\n{marker} {} ({})", group.category, group.visible_count());
        if !group.expanded {
            continue;
        }
        for bucket in group.buckets.iter().filter(|b| !b.findings.is_empty()) {
            println!("  [{}]", bucket.severity);
            for finding in &bucket.findings {
                println!("    - {}", finding.content);
            }
        }
    }
}
