//! Execution harness for SWE-bench-style agent tasks: provisions an
//! isolated container, drives a long-lived interactive shell inside it,
//! forwards agent-issued commands under bounded-latency semantics, and
//! reports structured test outcomes.

pub mod archive;
pub mod config;
pub mod container;
pub mod error;
pub mod hooks;
pub mod image;
pub mod interrupt;
pub mod model;
pub mod orchestrator;
pub mod parsers;
pub mod protocol;
pub mod recipe;
pub mod session;

pub use config::Config;
pub use error::{HarnessError, Result};
pub use model::{Command, EnvironmentSetup, Language, ResolvedIssue, TaskRecord, TestResult};
pub use orchestrator::Orchestrator;
pub use recipe::{ImageRecipe, RecipeRegistry};
pub use session::Session;
