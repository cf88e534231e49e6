//! Genesis Agent
//!
//! A conversational financial analysis agent that:
//! - Classifies a query into an intent with stock entities
//! - Plans tool calls as a dependency graph of steps
//! - Executes independent steps concurrently, level by level
//! - Passes earlier results into later steps through `$step_<i>` placeholders
//! - Tracks conversation context for follow-up questions
//!
//! Step failures are recorded in the results; only malformed or cyclic plans
//! abort a request. The LLM plans and formats but never executes.

pub mod agent;
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod intent;
pub mod llm;
pub mod models;
pub mod planner;
pub mod state;
pub mod tools;

pub use error::{AgentError, Result};

// Re-export common types
pub use agent::Agent;
pub use config::Settings;
pub use execution::{ExecutionReport, ExecutorConfig, PlanExecutor};
pub use models::*;
