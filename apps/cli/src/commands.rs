//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use importkit_core::{CancelToken, MemoryStore, Pipeline, ProgressReporter, RowFailure, RunReport};
use importkit_operators::{ConfigElement, OperatorRegistry, TreeBuilder, load_mapping};
use importkit_shared::{
    AppConfig, ElementId, Persister, RunId, RunSettings, init_config, load_config,
};
use importkit_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::input::{Batch, load_batch};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// importkit: run column transform trees over import batches.
#[derive(Parser)]
#[command(
    name = "importkit",
    version,
    about = "Transform tabular import rows into structured element data.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a mapping over an element batch and save the results.
    Run(RunArgs),

    /// Check that a mapping builds into a valid transform tree.
    Validate {
        /// Mapping file (.json or .toml).
        #[arg(short, long)]
        mapping: PathBuf,
    },

    /// List the registered operator kinds.
    Operators,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments of `importkit run`.
#[derive(clap::Args, Debug)]
pub(crate) struct RunArgs {
    /// Mapping file (.json or .toml).
    #[arg(short, long)]
    pub mapping: PathBuf,

    /// Element batch (JSON array).
    #[arg(short, long)]
    pub input: PathBuf,

    /// Database path (defaults to `storage.db_path` from config).
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Elements processed concurrently (defaults to config).
    #[arg(short, long)]
    pub concurrency: Option<u32>,

    /// Import unpublished elements too.
    #[arg(long)]
    pub admin: bool,

    /// Transform rows without saving anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Write the run report as JSON to this file.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "importkit=info",
        1 => "importkit=debug",
        _ => "importkit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Validate { mapping } => cmd_validate(&mapping),
        Command::Operators => cmd_operators(),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Load a mapping file and build its tree with the built-in registry.
fn build_tree(path: &Path, config: &AppConfig) -> Result<(String, ConfigElement)> {
    let mapping = load_mapping(path)?;
    let registry = OperatorRegistry::new();
    let root = TreeBuilder::new(&registry)
        .max_depth(config.defaults.max_tree_depth)
        .build(&mapping.root)
        .wrap_err_with(|| format!("invalid mapping '{}'", path.display()))?;
    Ok((mapping.name, root))
}

/// Merge CLI flags over config defaults.
fn resolve_settings(config: &AppConfig, args: &RunArgs) -> RunSettings {
    let mut settings = RunSettings::from(config);
    if let Some(concurrency) = args.concurrency {
        settings.concurrency = concurrency;
    }
    settings.admin_mode |= args.admin;
    settings.dry_run = args.dry_run;
    settings
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = load_config()?;
    let settings = resolve_settings(&config, &args);
    if settings.concurrency == 0 {
        return Err(eyre!("--concurrency must be at least 1"));
    }

    let (mapping_name, root) = build_tree(&args.mapping, &config)?;
    let batch = load_batch(&args.input)?;
    info!(
        mapping = %mapping_name,
        elements = batch.elements.len(),
        rows = batch.row_count(),
        "loaded batch"
    );

    // Dry runs never touch the database.
    let storage = if settings.dry_run {
        None
    } else {
        let db_path = args
            .db
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.storage.db_path));
        Some(Arc::new(Storage::open(&db_path).await?))
    };
    let persister: Arc<dyn Persister> = match &storage {
        Some(storage) => storage.clone() as Arc<dyn Persister>,
        None => Arc::new(MemoryStore::new()),
    };

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing elements in flight");
                cancel.cancel();
            }
        });
    }

    let progress = Arc::new(CliProgress::new());
    let pipeline = Pipeline::new(root, persister, settings).with_progress(progress);
    let report = execute_run(
        &pipeline,
        storage.as_deref(),
        &mapping_name,
        batch,
        &cancel,
    )
    .await?;

    let report_json = report.to_json()?;
    if let Some(path) = &args.report {
        std::fs::write(path, &report_json)
            .wrap_err_with(|| format!("failed to write report '{}'", path.display()))?;
    }

    print_report(&report, pipeline.settings().dry_run);
    Ok(())
}

/// Run the pipeline and keep the run audit in `storage` current, whether the
/// run completes or fails.
async fn execute_run(
    pipeline: &Pipeline,
    storage: Option<&Storage>,
    mapping_name: &str,
    batch: Batch,
    cancel: &CancelToken,
) -> Result<RunReport> {
    let run_id = RunId::new();
    let audit_id = run_id.to_string();
    if let Some(storage) = storage {
        storage.insert_run(&audit_id, mapping_name).await?;
    }

    match pipeline
        .run_as(run_id, batch.elements, batch.rows, cancel)
        .await
    {
        Ok(report) => {
            if let Some(storage) = storage {
                storage.finish_run(&audit_id, &report.to_json()?).await?;
            }
            Ok(report)
        }
        Err(e) => {
            warn!(run_id = %audit_id, error = %e, "run failed");
            if let Some(storage) = storage {
                let failure = serde_json::json!({ "error": e.to_string() }).to_string();
                if let Err(audit_err) = storage.finish_run(&audit_id, &failure).await {
                    warn!(run_id = %audit_id, error = %audit_err, "could not record failed run");
                }
            }
            Err(e.into())
        }
    }
}

fn print_report(report: &RunReport, dry_run: bool) {
    println!("Run {}", report.run_id);
    println!(
        "  rows: {} attempted, {} succeeded, {} failed",
        report.attempted, report.succeeded, report.failed
    );
    if report.elements_skipped > 0 {
        println!("  elements skipped: {}", report.elements_skipped);
    }
    if report.cancelled {
        println!("  cancelled before all elements started");
    }
    if dry_run {
        println!("  dry run: nothing was saved");
    }
    for failure in &report.failures {
        println!(
            "  ✗ {} row {}: {}",
            failure.element, failure.row_index, failure.cause
        );
    }
    println!(
        "  elapsed: {:.2}s",
        report.elapsed().num_milliseconds() as f64 / 1000.0
    );
}

fn cmd_validate(mapping: &Path) -> Result<()> {
    let config = load_config()?;
    let (name, root) = build_tree(mapping, &config)?;
    println!(
        "Mapping '{name}' is valid: {} nodes, depth {}",
        root.node_count(),
        root.depth()
    );
    Ok(())
}

fn cmd_operators() -> Result<()> {
    let registry = OperatorRegistry::new();
    for (kind, factory) in registry.kinds() {
        println!("{kind:<16} {}", factory.shape());
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn run_started(&self, run_id: &RunId, elements: usize) {
        self.spinner
            .set_message(format!("run {run_id}: {elements} elements"));
    }

    fn row_failed(&self, failure: &RowFailure) {
        self.spinner
            .println(format!("  ✗ {} row {}", failure.element, failure.row_index));
    }

    fn element_finished(&self, element: &ElementId, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {element}"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["importkit", "run", "--mapping", "m.json", "--input", "in.json"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Run(args) => args,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn flags_override_config() {
        let config = AppConfig::default();
        let settings = resolve_settings(&config, &args(&["-c", "9", "--admin", "--dry-run"]));
        assert_eq!(settings.concurrency, 9);
        assert!(settings.admin_mode);
        assert!(settings.dry_run);
    }

    #[test]
    fn config_used_without_flags() {
        let mut config = AppConfig::default();
        config.defaults.concurrency = 2;
        config.defaults.admin_mode = true;
        let settings = resolve_settings(&config, &args(&[]));
        assert_eq!(settings.concurrency, 2);
        assert!(settings.admin_mode);
        assert!(!settings.dry_run);
    }

    #[tokio::test]
    async fn failed_run_is_recorded() {
        let db = std::env::temp_dir().join(format!("ik_cli_{}.db", uuid::Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&db).await.expect("open db"));
        let pipeline = Pipeline::new(
            ConfigElement::iterator(Vec::new()),
            storage.clone(),
            RunSettings::default(),
        );
        // One element without a row set is rejected before any row runs.
        let batch = Batch {
            elements: vec![importkit_shared::Element::new("p-1", "Product")],
            rows: Vec::new(),
        };

        let err = execute_run(&pipeline, Some(storage.as_ref()), "products", batch, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("row sets"));

        let runs = storage.list_runs().await.expect("list runs");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].mapping_name, "products");
        assert!(runs[0].finished_at.is_some());
        assert!(runs[0].report_json.as_deref().unwrap_or("").contains("row sets"));
        let _ = std::fs::remove_file(&db);
    }

    #[tokio::test]
    async fn successful_run_is_recorded() {
        let db = std::env::temp_dir().join(format!("ik_cli_{}.db", uuid::Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&db).await.expect("open db"));
        let pipeline = Pipeline::new(
            ConfigElement::iterator(Vec::new()),
            storage.clone(),
            RunSettings::default(),
        );
        let batch = Batch {
            elements: vec![importkit_shared::Element::new("p-1", "Product")],
            rows: vec![vec![importkit_shared::RowData::from(&["a"][..])]],
        };

        let report = execute_run(&pipeline, Some(storage.as_ref()), "products", batch, &CancelToken::new())
            .await
            .expect("run");
        let record = storage
            .get_run(&report.run_id.to_string())
            .await
            .expect("get run")
            .expect("recorded");
        assert!(record.finished_at.is_some());
        assert!(record.report_json.expect("report").contains("\"succeeded\": 1"));
        let _ = std::fs::remove_file(&db);
    }

    #[test]
    fn build_tree_reports_unknown_operator() {
        let path = std::env::temp_dir().join(format!("ik_cli_{}.json", uuid::Uuid::now_v7()));
        std::fs::write(
            &path,
            r#"{ "name": "m", "root": { "kind": "iterator", "children": [{ "kind": "nope" }] } }"#,
        )
        .expect("write mapping");

        let err = build_tree(&path, &AppConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("nope"));
        let _ = std::fs::remove_file(&path);
    }
}
