//! CLI tool for xlingest - imports a cost report workbook and outputs JSON
//!
//! Usage:
//!   xlingest_cli <input.xlsx>                  # rows + validation + summary to stdout
//!   xlingest_cli <input.xlsx> -o out.json      # same, written to a file
//!   xlingest_cli <input.xlsx> --validate-only  # validation result only

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::error;
use serde::Serialize;

use xlingest::import::{Dataset, ImportSession, ImportSummary};
use xlingest::parser::{HostCapabilities, ParserKind};
use xlingest::schedule::{ImportContext, TokioScheduler};
use xlingest::source::FileSource;
use xlingest::types::{ParseProgress, RowRecord, ValidationResult};
use xlingest::{logging, ImportConfig, ImportError};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ParserArg {
    Streaming,
    InMemory,
}

impl From<ParserArg> for ParserKind {
    fn from(arg: ParserArg) -> Self {
        match arg {
            ParserArg::Streaming => Self::Streaming,
            ParserArg::InMemory => Self::InMemory,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "xlingest_cli", version, about = "Import a Cost Code Detail Report workbook")]
struct Args {
    /// Workbook to import
    input: PathBuf,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Force a parse path instead of choosing by size
    #[arg(long, value_enum)]
    parser: Option<ParserArg>,

    /// Stop after validation
    #[arg(long)]
    validate_only: bool,

    /// Size in MiB at which the streaming parser takes over
    #[arg(long)]
    threshold_mb: Option<u64>,

    /// Print progress messages to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct Output<'a> {
    validation: &'a ValidationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a ImportSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<&'a [RowRecord]>,
}

fn config_from(args: &Args) -> ImportConfig {
    let mut config = ImportConfig::default();
    if let Some(mb) = args.threshold_mb {
        config.streaming_threshold_bytes = mb.saturating_mul(1024 * 1024);
    }
    if let Some(parser) = args.parser {
        config = config.with_parser(parser.into());
    }
    config
}

async fn run(args: &Args) -> Result<bool, ImportError> {
    let source = FileSource::open(&args.input)?;
    let verbose = args.verbose;
    let mut print_progress = |p: &ParseProgress| {
        if verbose {
            match p.percent {
                Some(pct) => eprintln!("[{pct:>3}%] {}", p.message),
                None => eprintln!("[   ] {}", p.message),
            }
        }
    };
    let mut ctx =
        ImportContext::new(config_from(args), TokioScheduler).with_progress(&mut print_progress);

    let mut session = ImportSession::new(HostCapabilities::default());
    let validation = session.parse(&source, &mut ctx).await?.clone();

    let mut dataset = Dataset::new();
    let summary = if validation.valid && !args.validate_only {
        Some(session.commit(&mut ctx, &mut dataset).await?)
    } else {
        None
    };

    let output = Output {
        validation: &validation,
        summary: summary.as_ref(),
        rows: summary.as_ref().map(|_| dataset.records()),
    };
    let json = serde_json::to_string_pretty(&output).map_err(io::Error::from)?;

    match &args.output {
        Some(path) => {
            fs::write(path, &json)?;
            eprintln!("Written: {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            writeln!(stdout)?;
        }
    }
    Ok(validation.valid)
}

fn main() -> ExitCode {
    logging::init();
    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&args)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            eprintln!("Validation failed");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error importing {}: {e}", args.input.display());
            ExitCode::FAILURE
        }
    }
}
