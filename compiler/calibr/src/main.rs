use std::io::Write;
use std::path::PathBuf;

use calibr::{render_inspect, render_inspect_json, run_import, DriverError};
use calibr_annotate::ImportOptions;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;

#[derive(Debug, Parser)]
#[command(
    name = "calibr",
    version,
    about = "Imports calibration tables into float compute graphs",
    long_about = "calibr reads a calibration table produced by a calibration run and\n\
        attaches the recorded ranges to a TOP_F32 compute graph as calibrated\n\
        quantized types, per-channel weight scales and int4/int8 boundary attributes.\n\n\
        EXAMPLES:\n\
        \n  calibr import --table resnet.table -o resnet_cali.json resnet.json\n\
        \n  calibr import --table resnet.table --asymmetric < resnet.json\n\
        \n  calibr inspect resnet.table --json"
)]
struct Cli {
    /// Increase verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Calibrate a JSON module with a calibration table
    #[command(
        long_about = "Reads a JSON module (GRAPH or stdin), imports the calibration table\n\
            and writes the calibrated module as JSON (--out or stdout).\n\n\
            Exit codes: 0 success, 1 calibration error, 2 I/O or JSON error."
    )]
    Import(ImportArgs),

    /// Parse a calibration table and report what it holds
    Inspect(InspectArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PrecisionArg {
    Int8,
    Bf16,
    F32,
}

impl From<PrecisionArg> for calibr_annotate::Precision {
    fn from(arg: PrecisionArg) -> Self {
        match arg {
            PrecisionArg::Int8 => calibr_annotate::Precision::Int8,
            PrecisionArg::Bf16 => calibr_annotate::Precision::BF16,
            PrecisionArg::F32 => calibr_annotate::Precision::F32,
        }
    }
}

#[derive(Debug, Args, Clone)]
struct ImportArgs {
    /// Calibration table file
    #[arg(long, value_name = "FILE")]
    table: PathBuf,

    /// Keep recorded min/max instead of the symmetric threshold range
    #[arg(long)]
    asymmetric: bool,

    /// Storage type for values calibrated from the default table
    #[arg(long, value_enum, default_value_t = PrecisionArg::Int8)]
    precision: PrecisionArg,

    /// Output file for the calibrated module (stdout if not provided)
    #[arg(short = 'o', long = "out", value_name = "FILE")]
    out: Option<PathBuf>,

    /// Input JSON module (reads from stdin if not provided)
    #[arg(value_name = "GRAPH")]
    graph: Option<PathBuf>,
}

impl ImportArgs {
    fn options(&self) -> ImportOptions {
        ImportOptions::new(&self.table)
            .asymmetric(self.asymmetric)
            .precision(self.precision.into())
    }
}

#[derive(Debug, Args, Clone)]
struct InspectArgs {
    /// Calibration table file
    #[arg(value_name = "TABLE")]
    table: PathBuf,

    /// Dump the parsed tables as JSON
    #[arg(long)]
    json: bool,
}

fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn init_logger(verbose: u8) {
    // RUST_LOG, when set, overrides the -v level
    let _ = env_logger::Builder::new()
        .filter_level(level_for(verbose))
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();
}

fn run_import_command(args: &ImportArgs) -> Result<(), DriverError> {
    let report = run_import(args.graph.as_deref(), args.out.as_deref(), &args.options())?;
    let s = report.summary;
    log::info!(
        "done: {} values, {} weight scales, {} output / {} input boundaries",
        s.typed_values,
        s.weight_scales,
        s.output_boundaries,
        s.input_boundaries
    );
    Ok(())
}

fn run_inspect_command(args: &InspectArgs) -> Result<(), DriverError> {
    let parsed = calibr::inspect_table(&args.table)?;
    if args.json {
        println!("{}", render_inspect_json(&parsed)?);
    } else {
        println!("{}", render_inspect(&parsed));
    }
    Ok(())
}

fn run_cli(cli: Cli) -> i32 {
    init_logger(cli.verbose);
    let result = match &cli.command {
        Command::Import(args) => run_import_command(args),
        Command::Inspect(args) => run_inspect_command(args),
    };
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{}", err.render());
            err.exit_code()
        }
    }
}

fn main() {
    std::process::exit(run_cli(Cli::parse()));
}
