use clap::Parser;
use qbench::backend::ProcessRunner;
use qbench::benchmark::BenchmarkCase;
use qbench::cli::{self, Cli, Command};
use qbench::error::BenchError;
use qbench::report::RunReport;
use qbench::verbose::{self, Timer};
use qbench::{config, output};
use std::path::PathBuf;
use std::process;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() {
    // Load .env file (optional, ignore if missing)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(ref args) => run(args, cli.verbose, cli.show_secrets, cli.config.as_ref()).await,
        Command::Compare(ref args) => compare(args, cli.verbose, cli.show_secrets, cli.config.as_ref()),
    };

    match result {
        Ok(report) => {
            if let Err(err) = output::print_summary(&report) {
                output::print_error(&err);
            }
            if report.cancelled || !report.success() {
                process::exit(1);
            }
        }
        Err(err) => {
            output::print_error(&err);
            process::exit(1);
        }
    }
}

async fn run(
    args: &cli::CaseArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<RunReport, BenchError> {
    let app_config = config::load_from_case_args(args, verbose, show_secrets, config_path)?;
    verbose::init(app_config.verbose);
    debug!("{}", app_config.describe());
    let modes = config::resolve_modes(&args.mode)?;

    let bench = BenchmarkCase::new(&app_config, &args.case_no, modes, ProcessRunner)?;
    let mut report = bench.new_report();
    let timer = Timer::start();

    // Ctrl-C drops the run future, killing the child in flight.
    let cancelled = tokio::select! {
        result = bench.execute(args.load, &mut report) => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };
    if cancelled {
        warn!("interrupted, comparing the outputs written so far");
        report.cancelled = true;
    }

    bench.compare(&mut report)?;
    info!("case {} done ({}ms)", args.case_no, timer.elapsed_ms());
    output::write_report_json(&report, &bench.report_path())?;
    Ok(report)
}

fn compare(
    args: &cli::CaseArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<RunReport, BenchError> {
    let app_config = config::load_from_case_args(args, verbose, show_secrets, config_path)?;
    verbose::init(app_config.verbose);
    let modes = config::resolve_modes(&args.mode)?;

    let bench = BenchmarkCase::new(&app_config, &args.case_no, modes, ProcessRunner)?;
    let mut report = bench.new_report();
    bench.compare(&mut report)?;
    std::fs::create_dir_all(&bench.case().out_dir)?;
    output::write_report_json(&report, &bench.report_path())?;
    Ok(report)
}
