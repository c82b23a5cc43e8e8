//! Prompt Template System
//!
//! Loads and renders `.pmt` (prompt template) files for both agents.
//!
//! Template loading chain:
//! 1. `{prompts-dir}/{name}.pmt` (user override, if configured)
//! 2. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::{
    DirectoryEntry, IncomingContext, NudgeContext, OpeningContext, PromptLoader, RescheduleContext, SummaryContext,
};
