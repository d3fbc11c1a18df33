use crate::error::BenchError;
use crate::report::RunReport;
use std::fs;
use std::path::Path;

/// Print error to stderr in the contract format: error: <category>: <message>
pub fn print_error(err: &BenchError) {
    eprintln!("error: {}", err);
}

/// Render the run summary as a TOON object.
///
/// Summary keys: case, modes, baseline, success, per-mode query counts and
/// the discrepant files of each compared mode.
pub fn summary_toon(report: &RunReport) -> Result<String, BenchError> {
    let value = serde_json::to_value(report.summary()).map_err(|e| BenchError::Report {
        message: e.to_string(),
    })?;
    toon_format::encode_default(&value).map_err(|e| BenchError::Report {
        message: e.to_string(),
    })
}

/// Print the run summary to stdout.
pub fn print_summary(report: &RunReport) -> Result<(), BenchError> {
    let toon = summary_toon(report)?;
    print!("{}", toon);
    if !toon.ends_with('\n') {
        println!();
    }
    Ok(())
}

/// Write the full run report as pretty JSON.
pub fn write_report_json(report: &RunReport, path: &Path) -> Result<(), BenchError> {
    let json = serde_json::to_string_pretty(report).map_err(|e| BenchError::Report {
        message: e.to_string(),
    })?;
    write_output(path, json.as_bytes())
}

/// Write captured client output to a file whose directory must already exist.
pub fn write_output(path: &Path, content: &[u8]) -> Result<(), BenchError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        return Err(BenchError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("parent directory does not exist: {}", parent.display()),
        )));
    }
    fs::write(path, content)?;
    Ok(())
}

/// Sort lines bytewise, keeping each line's terminator.
///
/// A final line without a newline gets one, so that sorting is idempotent.
pub fn sort_lines(content: &[u8]) -> Vec<u8> {
    let mut lines: Vec<&[u8]> = content
        .split_inclusive(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\n").unwrap_or(line))
        .collect();
    lines.sort();

    let mut sorted = Vec::with_capacity(content.len() + 1);
    for line in lines {
        sorted.extend_from_slice(line);
        sorted.push(b'\n');
    }
    sorted
}

/// Sort an output file's lines in place.
pub fn sort_output_file(path: &Path) -> Result<(), BenchError> {
    let content = fs::read(path)?;
    fs::write(path, sort_lines(&content))?;
    Ok(())
}
