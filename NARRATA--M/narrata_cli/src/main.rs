use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use narrata_event_log::{EventLog, JsonLinesFile, LogEntry, LogHistory};
use narrata_workbench::{
    write_export, ClassifierAdapter, MajorityClassifier, NaiveBayesClassifier, TestRun,
    WorkbenchConfig, WorkbenchTelemetry, WorkflowController,
};
use tokio::runtime::Runtime;

const ROW_PREVIEW: usize = 10;

#[derive(Parser, Debug)]
#[command(name = "narrata", version, about = "Narrative classification workbench")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trains on one file, scores another and prints the accuracy table.
    Evaluate {
        #[arg(long)]
        train: PathBuf,
        #[arg(long)]
        test: PathBuf,
        /// Writes the results table here.
        #[arg(long)]
        export: Option<PathBuf>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Trains on one file and classifies a single text.
    Classify {
        #[arg(long)]
        train: PathBuf,
        #[arg(long)]
        text: String,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Replays a persisted operator log.
    Logs {
        #[arg(long)]
        log_file: PathBuf,
        /// Number of most recent entries to display.
        #[arg(long)]
        limit: Option<usize>,
        /// Only entries at or after this RFC 3339 timestamp.
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// TOML or JSON workbench configuration; environment overrides still apply.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Mirrors the operator log to a JSON-lines file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Writes machine telemetry to a JSON-lines file.
    #[arg(long)]
    telemetry: Option<PathBuf>,
    /// Comma-separated classifier variants, in registration order.
    #[arg(long, default_value = "majority,naive-bayes")]
    variants: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Evaluate {
            train,
            test,
            export,
            common,
        } => {
            let runtime = Runtime::new()?;
            let workbench = build_controller(&common)?;
            let run = runtime.block_on(async {
                workbench.upload_training(&read_table(&train)?).await?;
                workbench.train().await?;
                workbench.upload_test(&read_table(&test)?).await?;
                let run = workbench.batch_test().await?;
                if let Some(path) = &export {
                    let bytes = workbench.export().await?;
                    write_export(path, &bytes)?;
                }
                anyhow::Ok(run)
            });
            print_log(&workbench.log().history());
            let run = run?;
            print_run(&run);
            if let Some(path) = export {
                println!("results written to {}", path.display());
            }
            Ok(())
        }
        Commands::Classify {
            train,
            text,
            common,
        } => {
            let runtime = Runtime::new()?;
            let workbench = build_controller(&common)?;
            let outcome = runtime.block_on(async {
                workbench.upload_training(&read_table(&train)?).await?;
                workbench.train().await?;
                anyhow::Ok(workbench.classify(&text).await?)
            });
            print_log(&workbench.log().history());
            for prediction in &outcome?.predictions {
                println!(
                    "{:<16} {:<20} {:.2}",
                    prediction.variant, prediction.label, prediction.confidence
                );
            }
            Ok(())
        }
        Commands::Logs {
            log_file,
            limit,
            since,
        } => {
            let history = LogHistory::new(log_file);
            let entries = match (limit, since) {
                (_, Some(since)) => {
                    let mut entries = history.since(since)?;
                    if let Some(limit) = limit {
                        entries.drain(..entries.len().saturating_sub(limit));
                    }
                    entries
                }
                (Some(limit), None) => history.tail(limit)?,
                (None, None) => history.all()?,
            };
            print_log(&entries);
            Ok(())
        }
    }
}

fn build_controller(args: &CommonArgs) -> Result<WorkflowController> {
    let config = match &args.config {
        Some(path) => WorkbenchConfig::from_file(path)?,
        None => WorkbenchConfig::default(),
    }
    .with_env_overrides()?;

    let mut log = EventLog::new();
    if let Some(path) = &args.log_file {
        log = log.with_sink(Arc::new(JsonLinesFile::open(path)?));
    }
    let telemetry = match &args.telemetry {
        Some(path) => WorkbenchTelemetry::to_file(path)?,
        None => WorkbenchTelemetry::disabled(),
    };

    let mut workbench = WorkflowController::new(config)?
        .with_log(log)
        .with_telemetry(telemetry);
    for adapter in parse_variants(&args.variants)? {
        workbench = workbench.with_adapter(adapter);
    }
    Ok(workbench)
}

fn parse_variants(list: &str) -> Result<Vec<Arc<dyn ClassifierAdapter>>> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| -> Result<Arc<dyn ClassifierAdapter>> {
            match name {
                "majority" => Ok(Arc::new(MajorityClassifier::new())),
                "naive-bayes" => Ok(Arc::new(NaiveBayesClassifier::new())),
                other => bail!("unknown classifier variant {other:?}"),
            }
        })
        .collect()
}

fn read_table(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn print_log(entries: &[LogEntry]) {
    for entry in entries {
        println!("{}", entry.render());
    }
}

fn print_run(run: &TestRun) {
    println!();
    println!("{:<16} {:>8}", "variant", "accuracy");
    for (variant, accuracy) in run.evaluation.accuracy().iter() {
        println!("{variant:<16} {:>8}", accuracy.to_string());
    }
    if let Some((variant, percent)) = run.evaluation.accuracy().best_variant() {
        println!("best: {variant} ({percent:.1}%)");
    }

    println!();
    let variants: Vec<&str> = run.evaluation.variants().collect();
    println!("{:>4}  {:<40} {:<16} {}", "ID", "Narrative", "Actual", variants.join(" | "));
    for row in run.evaluation.rows().iter().take(ROW_PREVIEW) {
        let predicted: Vec<String> = variants
            .iter()
            .map(|variant| {
                let label = row
                    .predictions
                    .get(*variant)
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| "-".to_owned());
                let mark = if row.correct.get(*variant).copied().unwrap_or(false) {
                    "ok"
                } else {
                    "x"
                };
                format!("{label} ({mark})")
            })
            .collect();
        println!(
            "{:>4}  {:<40} {:<16} {}",
            row.id,
            narrata_workbench::export::excerpt(&row.narrative, 37, "..."),
            row.actual.as_deref().unwrap_or("-"),
            predicted.join(" | ")
        );
    }
    if run.evaluation.len() > ROW_PREVIEW {
        println!("... {} more rows", run.evaluation.len() - ROW_PREVIEW);
    }
}
