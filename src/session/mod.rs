//! Session layer: output buffering and ordered script execution.

mod buffer;
mod command;
mod script;
mod settle;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::OutputBuffer;
pub use command::CommandSession;
pub use script::{CommandScript, DEFAULT_SETTLE, ScriptStep};
pub use settle::SettleStrategy;
