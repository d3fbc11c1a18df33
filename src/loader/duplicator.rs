use crate::backend::process::{CommandRunner, CommandSpec};
use crate::config::AppConfig;
use crate::dataset::{TableDescriptor, TestCase};
use crate::error::BenchError;
use crate::loader::{run_tool, TableFailure};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Concatenated chunk data loaded for a duplicated table.
pub fn merged_chunk_file(case: &TestCase, table: &str) -> PathBuf {
    case.chunks_dir(table).join(format!("{table}.txt"))
}

/// Whether `name` looks like `chunk_NNNN.txt`.
pub fn is_chunk_file(name: &str) -> bool {
    name.strip_prefix("chunk_")
        .and_then(|rest| rest.strip_suffix(".txt"))
        .is_some_and(|digits| digits.len() == 4 && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Concatenate the `chunk_NNNN.txt` files of `dir` in name order into `target`.
///
/// `target` is truncated first so a rerun does not append twice. Returns the
/// number of chunk files merged.
pub fn merge_chunk_files(dir: &Path, target: &Path) -> io::Result<usize> {
    let mut chunks: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| is_chunk_file(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    chunks.sort();

    let mut writer = BufWriter::new(File::create(target)?);
    for chunk in &chunks {
        let mut reader = File::open(chunk)?;
        io::copy(&mut reader, &mut writer)?;
    }
    writer.flush()?;
    Ok(chunks.len())
}

/// Pre-expands duplicated tables into chunk files before any backend loads them.
pub struct DataDuplicator<'a, R> {
    config: &'a AppConfig,
    case: &'a TestCase,
    runner: R,
}

impl<'a, R: CommandRunner> DataDuplicator<'a, R> {
    pub fn new(config: &'a AppConfig, case: &'a TestCase, runner: R) -> Self {
        Self {
            config,
            case,
            runner,
        }
    }

    pub fn duplicator_command(&self, table: &TableDescriptor) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.config.tools.duplicator)
            .arg(format!(
                "--config={}",
                self.case.dataset.table_config(&table.name).display()
            ))
            .arg(format!("--chunks-dir={}", self.case.chunks_dir(&table.name).display()))
            .arg(&table.name);
        if let Some(data_file) = &table.data_file {
            spec = spec.arg(data_file.display().to_string());
        }
        spec
    }

    /// Duplicate every duplicated table; failures are returned per table.
    pub async fn run(&self) -> Vec<TableFailure> {
        let mut failures = Vec::new();
        for table in self.case.dataset.duplicated_tables() {
            if let Err(err) = self.duplicate_table(table).await {
                error!("cannot duplicate table {}: {}", table.name, err);
                failures.push(TableFailure {
                    table: table.name.clone(),
                    error: err.to_string(),
                });
            }
        }
        failures
    }

    async fn duplicate_table(&self, table: &TableDescriptor) -> Result<(), BenchError> {
        let chunks_dir = self.case.chunks_dir(&table.name);
        fs::create_dir_all(&chunks_dir)?;

        let spec = self.duplicator_command(table);
        run_tool(&self.runner, &spec, &table.name, self.config.show_secrets).await?;

        let target = merged_chunk_file(self.case, &table.name);
        let merged = merge_chunk_files(&chunks_dir, &target).map_err(|e| BenchError::Load {
            table: table.name.clone(),
            message: format!("cannot merge chunk files into {}: {}", target.display(), e),
        })?;
        info!("table {} duplicated into {} chunks", table.name, merged);
        Ok(())
    }
}
