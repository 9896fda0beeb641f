//! batch-migrate CLI - load NDJSON rows into PostgreSQL through the batch writer.

use batch_migrate::{
    BatchSink, BatchWriter, Config, DiscardSink, MigrateError, NdjsonReader, PgSink, WriteReport,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// Rows read ahead of the writer.
const READ_AHEAD_ROWS: usize = 4096;

/// Bad rows printed in the text summary.
const SUMMARY_SAMPLE_ROWS: usize = 5;

#[derive(Parser)]
#[command(name = "batch-migrate")]
#[command(about = "Adaptive concurrent batch loader for PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load rows from an NDJSON file into the target
    Load {
        /// NDJSON input file
        #[arg(short, long)]
        input: PathBuf,

        /// Read and batch rows without writing them
        #[arg(long)]
        dry_run: bool,

        /// Override the number of concurrent writes
        #[arg(long)]
        write_limit: Option<usize>,

        /// Override the split-retry budget
        #[arg(long)]
        retry_limit: Option<u64>,

        /// Trace every failed write, split and drop
        #[arg(long)]
        verbose: bool,
    },

    /// Test the target database connection
    HealthCheck,

    /// Validate the configuration and show effective writer settings
    ValidateConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Load {
            input,
            dry_run,
            write_limit,
            retry_limit,
            verbose,
        } => {
            // Apply overrides before auto-tuning so dependent values follow them
            if let Some(w) = write_limit {
                config.writer.write_limit = Some(w);
            }
            if let Some(r) = retry_limit {
                config.writer.retry_limit = Some(r);
            }
            if verbose {
                config.writer.verbose = true;
            }
            config.validate()?;
            let config = config.with_auto_tuning();

            let report = if dry_run {
                info!("Dry run: rows will be batched but not written");
                load(DiscardSink::new(), &config, &input).await?
            } else {
                let sink =
                    PgSink::new(&config.target, config.writer.get_max_connections()).await?;
                load(sink, &config, &input).await?
            };

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                print_summary(&report, dry_run);
            }
        }

        Commands::HealthCheck => {
            let sink = PgSink::new(&config.target, 1).await?;
            let result = sink.health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.connected { "OK" } else { "FAILED" },
                    result.latency_ms
                );
                if let Some(ref err) = result.error {
                    println!("    Error: {}", err);
                }
            }

            if !result.connected {
                return Err(MigrateError::pool(
                    result.error.unwrap_or_default(),
                    "health check",
                ));
            }
        }

        Commands::ValidateConfig => {
            let config = config.with_auto_tuning();
            let engine = config.writer.batch_writer_config();

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&config.writer)?);
            } else {
                println!("Configuration is valid");
                println!("  Config hash: {}", config.hash());
                println!("  Write limit: {}", engine.write_limit);
                println!("  Bytes limit: {}", engine.bytes_limit);
                println!("  Retry limit: {}", engine.retry_limit);
                println!("  Max mutations per batch: {}", engine.max_mutations);
                println!("  Max bytes per batch: {}", engine.max_batch_bytes);
                println!(
                    "  Max connections: {}",
                    config.writer.get_max_connections()
                );
            }
        }
    }

    Ok(())
}

/// Stream rows from `input` through a batch writer into `sink`.
///
/// A malformed input line stops reading; rows read before it are still
/// flushed before the error is returned.
async fn load<S: BatchSink>(sink: S, config: &Config, input: &Path) -> Result<WriteReport, MigrateError> {
    let mut writer = BatchWriter::new(sink, config.writer.batch_writer_config());
    let mut rows = NdjsonReader::open(input).await?.spawn(READ_AHEAD_ROWS);

    let mut input_error = None;
    while let Some(item) = rows.recv().await {
        match item {
            Ok(row) => writer.push(row).await,
            Err(e) => {
                input_error = Some(e);
                break;
            }
        }
    }

    writer.flush().await;
    let report = writer.report(config.hash());

    if let Some(e) = input_error {
        warn!(
            "Input stopped early; {} rows written before the error",
            report.rows_written
        );
        return Err(e);
    }

    info!(
        "Loaded {} of {} rows ({} dropped, {} retries)",
        report.rows_written, report.rows_added, report.rows_dropped, report.retries_consumed
    );
    Ok(report)
}

fn print_summary(report: &WriteReport, dry_run: bool) {
    let status_msg = if dry_run { "Dry run completed!" } else { "Load completed!" };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", report.run_id);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!("  Rows: {}/{}", report.rows_written, report.rows_added);
    println!("  Throughput: {} rows/sec", report.rows_per_second);
    if report.rows_dropped > 0 {
        println!("  Dropped rows: {}", report.rows_dropped);
        for (table, count) in &report.dropped_by_table {
            println!("    {}: {}", table, count);
        }
        println!("  Errors:");
        for (message, count) in &report.errors {
            println!("    {} x {}", count, message);
        }
        if !report.bad_row_sample.is_empty() {
            println!("  Sample bad rows:");
            for row in report.bad_row_sample.iter().take(SUMMARY_SAMPLE_ROWS) {
                println!("    {}", row);
            }
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
