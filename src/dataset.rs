use crate::error::BenchError;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the per-dataset metadata file inside `case<ID>/data/`.
pub const DESCRIPTION_FILE: &str = "description.yaml";
/// Loader configuration shared by every table of a dataset.
pub const COMMON_CONFIG_FILE: &str = "common.cfg";

// --- description.yaml structs ---

#[derive(Debug, Deserialize)]
struct Description {
    #[serde(default)]
    extensions: Extensions,
    #[serde(default)]
    tables: TablesSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Extensions {
    #[serde(default = "default_schema_ext")]
    pub schema: String,
    #[serde(default = "default_data_ext")]
    pub data: String,
    #[serde(default)]
    pub zip: Option<String>,
}

impl Default for Extensions {
    fn default() -> Self {
        Self {
            schema: default_schema_ext(),
            data: default_data_ext(),
            zip: None,
        }
    }
}

fn default_schema_ext() -> String {
    ".sql".to_string()
}

fn default_data_ext() -> String {
    ".txt".to_string()
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
struct TablesSection {
    #[serde(default)]
    load_order: Option<Vec<String>>,
    #[serde(default)]
    views: Vec<String>,
    #[serde(default)]
    directors: Vec<String>,
    #[serde(default)]
    partitioned_tables: Vec<String>,
    #[serde(default)]
    duplicated_tables: Vec<String>,
}

/// One table of a dataset, with its files and role flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub schema_file: PathBuf,
    /// `None` for views, which have no data to load.
    pub data_file: Option<PathBuf>,
    pub view: bool,
    pub director: bool,
    pub partitioned: bool,
    pub duplicated: bool,
}

/// Dataset metadata of a test case: which tables exist and in which order they load.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub data_dir: PathBuf,
    pub extensions: Extensions,
    /// Tables in load order, each resolving to a schema file.
    pub tables: Vec<TableDescriptor>,
    /// Tables found by the schema scan but left out of an explicit load order.
    pub not_loaded_tables: Vec<String>,
    /// Tables named in the load order without a schema file.
    pub unresolved_tables: Vec<String>,
}

impl Dataset {
    /// Read `description.yaml` and scan `data_dir` for schema files.
    pub fn load(data_dir: &Path) -> Result<Self, BenchError> {
        let description_path = data_dir.join(DESCRIPTION_FILE);
        let content = fs::read_to_string(&description_path).map_err(|e| BenchError::Config {
            message: format!(
                "cannot read dataset description {}: {}",
                description_path.display(),
                e
            ),
        })?;
        let description: Description =
            serde_yaml::from_str(&content).map_err(|e| BenchError::Config {
                message: format!(
                    "invalid dataset description {}: {}",
                    description_path.display(),
                    e
                ),
            })?;

        let scanned = scan_schema_tables(data_dir, &description.extensions.schema)?;
        debug!("tables found in {}: {:?}", data_dir.display(), scanned);

        Ok(Self::from_parts(data_dir, description, scanned))
    }

    fn from_parts(data_dir: &Path, description: Description, scanned: Vec<String>) -> Self {
        let Description { extensions, tables } = description;

        let (load_order, not_loaded_tables) = match tables.load_order {
            Some(order) if !order.is_empty() => {
                let declared: BTreeSet<&str> = order.iter().map(String::as_str).collect();
                let not_loaded = scanned
                    .iter()
                    .filter(|t| !declared.contains(t.as_str()))
                    .cloned()
                    .collect();
                (order, not_loaded)
            }
            _ => (scanned.clone(), Vec::new()),
        };

        let mut descriptors = Vec::with_capacity(load_order.len());
        let mut unresolved_tables = Vec::new();
        for name in load_order {
            if !scanned.contains(&name) {
                warn!("table {} is in the load order but has no schema file", name);
                unresolved_tables.push(name);
                continue;
            }
            let view = tables.views.contains(&name);
            let data_file = if view {
                None
            } else {
                Some(data_dir.join(data_file_name(&name, &extensions)))
            };
            descriptors.push(TableDescriptor {
                schema_file: data_dir.join(format!("{}{}", name, extensions.schema)),
                data_file,
                view,
                director: tables.directors.contains(&name),
                partitioned: tables.partitioned_tables.contains(&name),
                duplicated: tables.duplicated_tables.contains(&name),
                name,
            });
        }

        Self {
            data_dir: data_dir.to_path_buf(),
            extensions,
            tables: descriptors,
            not_loaded_tables,
            unresolved_tables,
        }
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn duplicated_tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.iter().filter(|t| t.duplicated)
    }

    pub fn has_duplicated_tables(&self) -> bool {
        self.tables.iter().any(|t| t.duplicated)
    }

    pub fn common_config(&self) -> PathBuf {
        self.data_dir.join(COMMON_CONFIG_FILE)
    }

    /// Per-table loader configuration `<table>.cfg`, present or not.
    pub fn table_config(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{table}.cfg"))
    }
}

fn data_file_name(table: &str, extensions: &Extensions) -> String {
    let mut name = format!("{}{}", table, extensions.data);
    if let Some(zip) = &extensions.zip {
        name.push_str(zip);
    }
    name
}

/// Table names deduced from `<table><schema_ext>` files, sorted.
fn scan_schema_tables(data_dir: &Path, schema_ext: &str) -> Result<Vec<String>, BenchError> {
    let entries = fs::read_dir(data_dir).map_err(|e| BenchError::Config {
        message: format!("cannot list data directory {}: {}", data_dir.display(), e),
    })?;

    let mut tables = Vec::new();
    for entry in entries {
        let file_name = entry?.file_name().to_string_lossy().into_owned();
        if let Some(table) = file_name.strip_suffix(schema_ext)
            && !table.is_empty()
        {
            tables.push(table.to_string());
        }
    }
    tables.sort();
    Ok(tables)
}

/// A named test case: dataset location, query corpus and output root.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub case_id: String,
    pub dataset_dir: PathBuf,
    pub queries_dir: PathBuf,
    pub out_dir: PathBuf,
    pub dataset: Dataset,
}

impl TestCase {
    /// Locate `case<ID>` under `testdata_dir` and read its dataset description.
    ///
    /// A missing datasets directory is a configuration error.
    pub fn new(case_id: &str, testdata_dir: &Path, out_root: &Path) -> Result<Self, BenchError> {
        let dataset_dir = dataset_dir(testdata_dir, case_id)?;
        let dataset = Dataset::load(&dataset_dir.join("data"))?;
        Ok(Self {
            case_id: case_id.to_string(),
            queries_dir: dataset_dir.join("queries"),
            dataset_dir,
            out_dir: out_root.join(format!("qservTest_case{case_id}")),
            dataset,
        })
    }

    /// Database name used for one backend family.
    pub fn database_name(&self, suffix: &str) -> String {
        format!("qservTest_case{}_{}", self.case_id, suffix)
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.out_dir.join("outputs")
    }

    /// Where duplicated chunk files for `table` are produced and consumed.
    pub fn chunks_dir(&self, table: &str) -> PathBuf {
        self.out_dir.join("chunks").join(table)
    }
}

/// Directory holding a test case's data and queries.
pub fn dataset_dir(testdata_dir: &Path, case_id: &str) -> Result<PathBuf, BenchError> {
    if !testdata_dir.is_dir() {
        return Err(BenchError::Config {
            message: format!(
                "datasets directory ({}) doesn't exist or isn't a directory",
                testdata_dir.display()
            ),
        });
    }
    let dir = testdata_dir.join(format!("case{case_id}"));
    if !dir.is_dir() {
        return Err(BenchError::Config {
            message: format!("test case directory not found: {}", dir.display()),
        });
    }
    Ok(dir)
}
