//! # Mailcast CLI
//!
//! The `mailcast` binary: submit or run a dispatch, query job status, run a
//! worker, and maintain the recipient list.

pub mod cli;
