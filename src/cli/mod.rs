//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the storage and audit layers.

pub mod history;
pub mod row;

pub use history::{handle_history_command, HistoryCommands};
pub use row::{handle_row_command, ActorArgs, RowCommands};
