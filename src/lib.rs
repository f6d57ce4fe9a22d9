pub mod completion;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod session;
pub mod util;

pub use error::{Error, Result};
pub use orchestration::{CompiledOutput, Orchestrator, PlanRequest};
pub use session::{SessionState, SessionStore};
