use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("config: {message}")]
    Config { message: String },

    #[error("client: {message}")]
    ClientInvocation { message: String },

    #[error("submit: {message}")]
    Submission { message: String },

    #[error("timeout: query {query_id} not completed after {seconds}s")]
    AsyncTimeout { query_id: u64, seconds: u64 },

    #[error("load: table {table}: {message}")]
    Load { table: String, message: String },

    #[error("catalog: {message}")]
    Catalog { message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("report: {message}")]
    Report { message: String },
}

impl BenchError {
    /// Errors that abort the whole run rather than a single query or table.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BenchError::Config { .. } | BenchError::Catalog { .. })
    }
}
