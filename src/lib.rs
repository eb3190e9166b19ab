//! Scholarship records sidecar: SQLite workspace, CSV/ZIP bulk import, and a
//! newline-delimited JSON IPC surface over stdio.

pub mod config;
pub mod db;
pub mod domain;
pub mod import;
pub mod ipc;
pub mod logging;
