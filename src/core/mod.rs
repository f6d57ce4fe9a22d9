//! Core domain models for workflow orchestration.
//!
//! This module contains the task kinds, the task and outcome types, and the
//! dependency DAG used to reason about a task set.

pub mod dag;
pub mod kind;
pub mod task;

pub use dag::{BlockReason, TaskDAG};
pub use kind::TaskKind;
pub use task::{Task, TaskOrigin, TaskOutcome, WorkflowId, INJECTED_PRIORITY};
