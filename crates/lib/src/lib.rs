//! Courier core library: signal-cli JSON-RPC ingestion engine, attachment resolver,
//! SQLite store, and the startup pieces used by the CLI.

pub mod config;
pub mod engine;
pub mod ingest;
pub mod init;
pub mod rpc;
pub mod store;
pub mod supervisor;
