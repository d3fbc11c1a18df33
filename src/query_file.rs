//! Annotated query files.
//!
//! One `.sql` file serves every backend. Line-level directives select the
//! lines meant for Qserv or MySQL only, and `-- pragma` lines tune how the
//! output is captured and compared:
//!
//! ```text
//! -- pragma sortresult async_timeout=120
//! SELECT objectId, ra_PS
//! FROM Object
//! -- withQserv WHERE qserv_areaspec_box(0, 0, 3, 10)
//! WHERE scisql_s2PtInBox(ra_PS, decl_PS, 0, 0, 3, 10) = 1 -- noQserv
//! ```

use crate::error::BenchError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Prefix of lines kept only when targeting Qserv.
pub const WITH_QSERV_MARKER: &str = "-- withQserv";
/// Suffix of lines dropped when targeting Qserv.
pub const NO_QSERV_MARKER: &str = "-- noQserv";
const COMMENT_MARKER: &str = "--";
const PRAGMA_TOKEN: &str = "pragma";

/// Number of leading filename characters holding the sequence id.
const SEQUENCE_DIGITS: usize = 4;

/// Pragmas collected from one query file, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pragmas(BTreeMap<String, Option<String>>);

impl Pragmas {
    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        self.0.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Column headers are suppressed.
    pub fn no_header(&self) -> bool {
        self.contains("noheader")
    }

    /// Output lines are sorted before comparison.
    pub fn sort_result(&self) -> bool {
        self.contains("sortresult")
    }

    /// Forces synchronous execution in async-capable modes.
    pub fn no_async(&self) -> bool {
        self.contains("no_async")
    }

    /// Per-file override of the async wait budget, in seconds.
    ///
    /// A value that is not a non-negative integer is ignored with a warning.
    pub fn async_timeout(&self) -> Option<u64> {
        let raw = self.get("async_timeout")?;
        match raw.parse::<u64>() {
            Ok(secs) => Some(secs),
            Err(e) => {
                warn!("ignoring pragma async_timeout={}: {}", raw, e);
                None
            }
        }
    }
}

/// Canonical query text and pragmas for one backend flavor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    pub text: String,
    pub pragmas: Pragmas,
}

/// Filter query file content for Qserv (`with_qserv`) or MySQL and collect pragmas.
pub fn parse_query(content: &str, with_qserv: bool) -> ParsedQuery {
    let mut text: Vec<String> = Vec::new();
    let mut pragmas = Pragmas::default();

    for raw in content.lines() {
        let line = raw.split_whitespace().collect::<Vec<_>>().join(" ");

        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix(WITH_QSERV_MARKER) {
            let rest = rest.trim_start();
            if with_qserv && !rest.is_empty() {
                text.push(rest.to_string());
            }
        } else if let Some(rest) = line.strip_suffix(NO_QSERV_MARKER) {
            let rest = rest.trim_end();
            if !with_qserv && !rest.is_empty() {
                text.push(rest.to_string());
            }
        } else if is_pragma_line(&line) {
            // '-- pragma keyval [keyval...]', keyval being 'key=value' or 'key'
            for keyval in line.split_whitespace().skip(2) {
                match keyval.split_once('=') {
                    Some((key, value)) => pragmas.insert(key, Some(value.to_string())),
                    None => pragmas.insert(keyval, None),
                }
            }
        } else {
            text.push(line);
        }
    }

    ParsedQuery {
        text: text.join(" "),
        pragmas,
    }
}

fn is_pragma_line(line: &str) -> bool {
    let mut words = line.split_whitespace();
    words.next() == Some(COMMENT_MARKER) && words.next() == Some(PRAGMA_TOKEN)
}

/// A `.sql` file of the query corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFile {
    pub path: PathBuf,
    pub file_name: String,
    pub sequence_id: u32,
}

impl QueryFile {
    /// Name of the output file for this query: `.sql` replaced by `.txt`.
    pub fn output_name(&self) -> String {
        let stem = self.file_name.strip_suffix(".sql").unwrap_or(&self.file_name);
        format!("{stem}.txt")
    }

    pub fn read(&self) -> Result<String, BenchError> {
        fs::read_to_string(&self.path).map_err(BenchError::Io)
    }
}

/// Parse the zero-padded sequence id from the first four filename characters.
pub fn sequence_id(file_name: &str) -> Option<u32> {
    let prefix = file_name.get(..SEQUENCE_DIGITS)?;
    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

/// List the query corpus of `dir` in filename order.
///
/// Files without a numeric prefix are skipped with a warning.
pub fn list_query_files(dir: &Path) -> Result<Vec<QueryFile>, BenchError> {
    let entries = fs::read_dir(dir).map_err(|e| BenchError::Config {
        message: format!("cannot list queries directory {}: {}", dir.display(), e),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.ends_with(".sql") || !entry.path().is_file() {
            continue;
        }
        match sequence_id(&file_name) {
            Some(sequence_id) => files.push(QueryFile {
                path: entry.path(),
                file_name,
                sequence_id,
            }),
            None => warn!("skipping query file without sequence number: {}", file_name),
        }
    }

    files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(files)
}
