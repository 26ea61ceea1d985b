//! vPGM Control library - command handlers and terminal output.

pub mod commands;
pub mod output;

pub use commands::{check_reply, Session};
