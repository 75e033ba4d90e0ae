//! Runtime system
//!
//! This module contains the execution contexts, the executors they are
//! scheduled on and the task flow built on top of them.
//!
//! - [`value`] - type-erased values passed between tasks
//! - [`context`] - owner and cancellation bindings travelling with continuations
//! - [`controller`] - hierarchical cancellation flags
//! - [`apartment`] - executors for scheduled work
//! - [`future`] - single-assignment results with gated continuations
//! - [`flow`] - the DAG task flow

pub mod apartment;
pub mod context;
pub mod controller;
pub mod error;
pub mod flow;
pub mod future;
pub mod priority;
pub mod value;

pub use error::{FlowError, FlowResult};
pub use priority::Priority;
