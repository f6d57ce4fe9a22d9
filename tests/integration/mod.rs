//! Integration test suite for archai.
//!
//! These tests drive the full request path (planner, executor, compiler and
//! session store) against scripted completion clients.
//!
//! # Test Categories
//!
//! - `workflow_e2e`: planning, dependency context, failures and injection
//! - `parallel_agents`: fan-out, concurrency bound, timeouts, cancellation
//! - `sessions`: context carry-over, per-session serialization, persistence
//!
//! # CI Compatibility
//!
//! No test performs a network call.

mod fixtures;

mod parallel_agents;
mod workflow_e2e;
