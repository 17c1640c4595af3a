//! pg-parallel-dump CLI - consistent, concurrent PostgreSQL logical dumps.

use clap::{Args, Parser, Subcommand};
use pg_parallel_dump::{
    Config, CsvDirSink, DataFormat, DumpError, DumpOptions, DumpReport, Dumper, OnTableError,
    PgSnapshotSource, SqlSink,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncWrite, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "pg-parallel-dump")]
#[command(about = "Consistent, concurrent logical dumps of PostgreSQL databases")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON run report to stdout
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
    /// Write a SQL dump of every selected table
    Dump {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Data block format: copy or insert
        #[arg(long)]
        format: Option<String>,

        /// Failed table policy: continue or abort
        #[arg(long)]
        on_error: Option<String>,

        #[command(flatten)]
        selection: Selection,
    },

    /// Write one CSV file per selected table
    Csv {
        /// Output directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Failed table policy: continue or abort
        #[arg(long)]
        on_error: Option<String>,

        #[command(flatten)]
        selection: Selection,
    },

    /// List the tables a dump would cover
    Tables {
        #[command(flatten)]
        selection: Selection,
    },
}

/// Table selection and concurrency overrides shared by every subcommand.
#[derive(Args)]
struct Selection {
    /// Override number of concurrently dumped tables
    #[arg(short, long)]
    parallelism: Option<i64>,

    /// Override schema to dump
    #[arg(long)]
    schema: Option<String>,

    /// Only tables whose name starts with this
    #[arg(long)]
    prefix: Option<String>,

    /// Only tables whose name ends with this
    #[arg(long)]
    suffix: Option<String>,

    /// Skip a table, as name or schema.name (repeatable)
    #[arg(long = "ignore", value_name = "TABLE")]
    ignore: Vec<String>,
}

impl Selection {
    fn apply(self, config: &mut Config) {
        if let Some(p) = self.parallelism {
            config.dump.parallelism = Some(p);
        }
        if let Some(schema) = self.schema {
            config.dump.schema = schema;
        }
        if let Some(prefix) = self.prefix {
            config.dump.name_prefix = prefix;
        }
        if let Some(suffix) = self.suffix {
            config.dump.name_suffix = suffix;
        }
        config.dump.ignore_tables.extend(self.ignore);
    }
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

async fn run() -> Result<(), DumpError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(DumpError::Config)?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let cancel_token = setup_signal_handler();

    match cli.command {
        Commands::Dump {
            output,
            format,
            on_error,
            selection,
        } => {
            selection.apply(&mut config);
            if let Some(f) = format {
                config.dump.data_format = DataFormat::parse(&f)?;
            }
            if let Some(policy) = on_error {
                config.dump.on_table_error = OnTableError::parse(&policy)?;
            }
            config.validate()?;

            if cli.output_json && output.is_none() {
                return Err(DumpError::Config(
                    "--output-json needs --output; the dump itself is written to stdout".into(),
                ));
            }

            let dumper = connect(&config).await?;
            let writer: Box<dyn AsyncWrite + Unpin + Send> = match &output {
                Some(path) => Box::new(BufWriter::new(tokio::fs::File::create(path).await?)),
                None => Box::new(BufWriter::new(tokio::io::stdout())),
            };
            let mut sink = SqlSink::new(writer, config.dump.data_format);

            let report = dumper.run(&mut sink, Some(cancel_token)).await?;
            if let Some(path) = &output {
                info!("Wrote {} bytes to {}", sink.bytes_written(), path.display());
            }

            print_report(&report, cli.output_json)?;
        }

        Commands::Csv {
            dir,
            on_error,
            selection,
        } => {
            selection.apply(&mut config);
            if let Some(policy) = on_error {
                config.dump.on_table_error = OnTableError::parse(&policy)?;
            }
            config.validate()?;

            let dumper = connect(&config).await?;
            let mut sink = CsvDirSink::create(&dir).await?;

            let report = dumper.run(&mut sink, Some(cancel_token)).await?;
            print_report(&report, cli.output_json)?;
        }

        Commands::Tables { selection } => {
            selection.apply(&mut config);
            config.validate()?;

            let source = PgSnapshotSource::new(&config.source, 1).await?;
            let dumper = Dumper::new(Arc::new(source), DumpOptions::from_config(&config.dump));
            let tables = dumper.list_tables().await?;

            if cli.output_json {
                let names: Vec<String> = tables.iter().map(|t| t.full_name()).collect();
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else {
                for table in &tables {
                    println!("{}", table.full_name());
                }
            }
        }
    }

    Ok(())
}

/// Open a pool sized for the run: one session per in-flight table plus the
/// snapshot leader.
async fn connect(config: &Config) -> Result<Dumper, DumpError> {
    let options = DumpOptions::from_config(&config.dump);
    info!(
        "Connecting to {} with parallelism {}",
        config.source.describe(),
        options.parallelism
    );
    let source = PgSnapshotSource::new(&config.source, options.parallelism + 1).await?;
    Ok(Dumper::new(Arc::new(source), options))
}

/// Summary goes to stderr so it never mixes with a dump on stdout.
fn print_report(report: &DumpReport, as_json: bool) -> Result<(), DumpError> {
    if as_json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    eprintln!("\nDump completed!");
    eprintln!("  Run ID: {}", report.run_id);
    eprintln!("  Server version: {}", report.server_version);
    eprintln!("  Duration: {:.2}s", report.duration_seconds);
    eprintln!(
        "  Tables: {}/{}",
        report.tables_dumped, report.tables_total
    );
    eprintln!("  Rows: {}", report.rows_dumped);
    if !report.files.is_empty() {
        eprintln!("  Files: {}", report.files.len());
    }
    for failed in &report.failed_tables {
        eprintln!("  Failed: {} ({})", failed.table, failed.error);
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
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

    let installed = match format {
        "json" => subscriber.json().try_init(),
        "text" => subscriber.try_init(),
        other => return Err(format!("unknown log format '{}'", other)),
    };
    installed.map_err(|e| e.to_string())
}

/// Cancel the run on SIGINT or SIGTERM. The current group finishes, no further
/// group starts, and the snapshot is released before the process exits.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to install {} handler: {}", name, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!("\nReceived {}. Stopping dump...", name);
            token.cancel();
        });
    }

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl-C handler: {}", e);
            return;
        }
        eprintln!("\nReceived Ctrl-C. Stopping dump...");
        token.cancel();
    });

    cancel_token
}
