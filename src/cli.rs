use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "qbench",
    about = "Load datasets into MySQL and Qserv, run the same queries, diff the results"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short = 'c', long, global = true, env = "QBENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit debug diagnostics to stderr
    #[arg(short = 'v', long, global = true, env = "QBENCH_VERBOSE")]
    pub verbose: bool,

    /// Disable credential masking in logged command lines
    #[arg(long, global = true, env = "QBENCH_SHOW_SECRETS")]
    pub show_secrets: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a test case against each mode and compare the outputs
    Run(CaseArgs),

    /// Compare outputs left by a previous run without executing queries
    Compare(CaseArgs),
}

#[derive(Parser, Debug)]
pub struct CaseArgs {
    /// Test case number (directory case<NO> in the datasets directory)
    #[arg(short = 'i', long = "case-no", default_value = "01")]
    pub case_no: String,

    /// Modes to run: mysql, qserv, qserv-async or all (repeatable)
    #[arg(short = 'm', long = "mode")]
    pub mode: Vec<String>,

    /// Stop at query with given number
    #[arg(short = 's', long = "stop-at-query")]
    pub stop_at_query: Option<u32>,

    /// Load test dataset prior to query execution
    #[arg(short = 'l', long = "load")]
    pub load: bool,

    /// Directory for results, stored in <OUT_DIR>/qservTest_case<NO>/
    #[arg(short = 'o', long = "out-dir", env = "QBENCH_OUT_DIR")]
    pub out_dir: Option<PathBuf>,

    /// Directory containing the test datasets
    #[arg(short = 't', long = "testdata-dir", env = "QBENCH_TESTDATA_DIR")]
    pub testdata_dir: Option<PathBuf>,
}
