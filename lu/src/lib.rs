//! LinkUp - group hangout orchestration
//!
//! Watches group chats, fans out private preference chats to every member,
//! and hands the collected answers back to the group as a plan. All the
//! talking is done by remote agents; this crate owns the state machine, the
//! tool surface they act through, and the polling that feeds them.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod engine;
pub mod exchange;
pub mod limiter;
pub mod llm;
pub mod memory;
pub mod poller;
pub mod prompts;
pub mod state;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use engine::{Engine, SharedSession};
pub use poller::Poller;
