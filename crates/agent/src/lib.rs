//! Orchestration for Avacyn.
//!
//! Two entry points: `TurnRunner` drives a streaming chat turn with the
//! built-in tools, and `ExecutionRunner` runs a user-authored agent over a
//! single input with its dynamic tools.

pub mod execution;
pub mod prompts;
pub mod turn;

pub use execution::{ExecutionRunner, EXECUTION_FAILED_OUTPUT};
pub use turn::{most_recent_user_message, TurnRunner};
