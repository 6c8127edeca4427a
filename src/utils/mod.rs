//! Generic utility primitives with zero domain knowledge.
//!
//! - `command` - External command execution with echo and typed failures
//! - `shell` - Shell escaping and quoting

pub mod command;
pub mod shell;
