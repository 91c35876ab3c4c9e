#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod host;
pub mod launch;
pub mod output;
pub mod prompt;
pub mod session;
pub mod tui;
