pub mod backend;
pub mod benchmark;
pub mod cli;
pub mod compare;
pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod masking;
pub mod output;
pub mod query_file;
pub mod report;
pub mod runner;
pub mod verbose;
