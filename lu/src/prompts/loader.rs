//! Prompt Loader
//!
//! Loads prompt templates from files or falls back to embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;
use crate::aggregate::MemberPreferences;
use crate::config::GroupConfig;

/// One roster line: name and contact
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub contact: String,
}

impl DirectoryEntry {
    /// The whole roster, in config order
    pub fn roster(group: &GroupConfig) -> Vec<Self> {
        group
            .members
            .iter()
            .map(|m| Self {
                name: m.name.clone(),
                contact: m.contact.clone(),
            })
            .collect()
    }
}

/// Context for `incoming`
#[derive(Debug, Clone, Serialize)]
pub struct IncomingContext {
    pub group_name: String,
    pub members: Vec<DirectoryEntry>,
    pub sender: String,
    pub text: String,
}

/// Context for `nudge`
#[derive(Debug, Clone, Serialize)]
pub struct NudgeContext {
    pub group_name: String,
    pub members: Vec<DirectoryEntry>,
    pub days: i64,
    pub threshold_days: i64,
}

/// Context for `opening`
#[derive(Debug, Clone, Serialize)]
pub struct OpeningContext {
    pub group_name: String,
    pub member_name: String,
}

/// Context for `reschedule`
#[derive(Debug, Clone, Serialize)]
pub struct RescheduleContext {
    pub group_name: String,
    pub member_name: String,
    pub conflict: String,
    pub prior_activity: Option<String>,
}

/// Context for `summary`
#[derive(Debug, Clone, Serialize)]
pub struct SummaryContext {
    pub group_name: String,
    pub members: Vec<DirectoryEntry>,
    pub preferences: Vec<MemberPreferences>,
    pub message_limit: u32,
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory
    user_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that checks `user_dir` before the embedded prompts
    pub fn new(user_dir: Option<&Path>) -> Self {
        debug!(?user_dir, "PromptLoader::new: called");
        let user_dir = user_dir.filter(|d| d.exists()).map(Path::to_path_buf);
        if user_dir.is_none() {
            debug!("PromptLoader::new: no user override directory");
        }
        Self {
            hbs: Self::engine(),
            user_dir,
        }
    }

    /// Create a loader that only uses embedded prompts (for testing)
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            user_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // Chat text, not HTML
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. User override: `{user_dir}/{name}.pmt`
    /// 2. Embedded fallback
    pub fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref user_dir) = self.user_dir {
            let path = user_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in user override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read user prompt {}: {}", path.display(), e));
            }
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "PromptLoader::load_template: found in embedded");
            return Ok(content.to_string());
        }

        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }

    pub fn group_system(&self) -> Result<String> {
        self.load_template("group-system")
    }

    pub fn direct_system(&self) -> Result<String> {
        self.load_template("direct-system")
    }

    pub fn direct_nudge(&self) -> Result<String> {
        self.load_template("direct-nudge")
    }
}
