//! LinkUp configuration types and loading

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main LinkUp configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote decision service (group + DM assistants)
    pub agents: AgentsConfig,

    /// Messaging transport
    pub transport: TransportConfig,

    /// Long-term memory store
    pub memory: MemoryConfig,

    /// Poll driver settings
    pub polling: PollingConfig,

    /// Plan delivery quota and cooldowns
    pub limits: LimitsConfig,

    /// Persisted session state
    pub state: StateConfig,

    /// Directory with `.pmt` overrides for the embedded prompts
    #[serde(rename = "prompts-dir")]
    pub prompts_dir: Option<PathBuf>,

    /// Monitored group chats
    pub groups: Vec<GroupConfig>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// These are the fatal bootstrap checks: a missing key or an empty roster
    /// stops the process before any polling starts.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.agents.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "Agent API key not found. Set the {} environment variable.",
                self.agents.api_key_env
            ));
        }
        self.validate_groups()
    }

    /// Validate the group roster (no environment access)
    pub fn validate_groups(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(eyre::eyre!("No group chats configured"));
        }

        let mut seen = HashSet::new();
        for group in &self.groups {
            if group.members.is_empty() {
                return Err(eyre::eyre!("Group '{}' has no members", group.name));
            }
            if !seen.insert(group.chat_id.as_str()) {
                return Err(eyre::eyre!("Group chat id '{}' is configured twice", group.chat_id));
            }
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .linkup.yml
        let local_config = PathBuf::from(".linkup.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/linkup/linkup.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("linkup").join("linkup.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialised
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Look up a group by its chat id
    pub fn group(&self, chat_id: &str) -> Option<&GroupConfig> {
        self.groups.iter().find(|g| g.chat_id == chat_id)
    }
}

/// Remote decision service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Assistant that talks to the group chat
    #[serde(rename = "group-assistant-id")]
    pub group_assistant_id: String,

    /// Assistant that runs the one-on-one preference chats
    #[serde(rename = "direct-assistant-id")]
    pub direct_assistant_id: String,

    /// Upstream LLM provider requested per turn
    pub provider: String,

    /// Model used for group turns
    #[serde(rename = "group-model")]
    pub group_model: String,

    /// Model used for DM turns
    #[serde(rename = "direct-model")]
    pub direct_model: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://app.backboard.io/api".to_string(),
            api_key_env: "BACKBOARD_API_KEY".to_string(),
            group_assistant_id: String::new(),
            direct_assistant_id: String::new(),
            provider: "anthropic".to_string(),
            group_model: "claude-opus-4-1".to_string(),
            direct_model: "claude-sonnet-4-5".to_string(),
            timeout_ms: 120_000,
        }
    }
}

impl AgentsConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).context(format!("Environment variable {} not set", self.api_key_env))
    }
}

/// Messaging transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Path to the local Messages database
    #[serde(rename = "chat-db")]
    pub chat_db: PathBuf,

    /// AppleScript runner used for outbound messages
    pub osascript: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        let chat_db = dirs::home_dir()
            .map(|h| h.join("Library").join("Messages").join("chat.db"))
            .unwrap_or_else(|| PathBuf::from("chat.db"));

        Self {
            chat_db,
            osascript: "osascript".to_string(),
        }
    }
}

/// Long-term memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Disable to run without history (every query answers "no history")
    pub enabled: bool,

    /// SQLite database for preference and hangout history
    pub path: PathBuf,

    /// Link handed out by the fallback suggestion tool
    #[serde(rename = "suggestion-url")]
    pub suggestion_url: Option<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: data_dir().join("memory.db"),
            suggestion_url: None,
        }
    }
}

/// Poll driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval between poll cycles in milliseconds
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 10_000 }
    }
}

impl PollingConfig {
    /// Get the poll interval as a Duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Outbound rate limits and cooldowns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Group messages allowed per plan delivery
    #[serde(rename = "plan-message-limit")]
    pub plan_message_limit: u32,

    /// Seconds after plan delivery during which group messages are dropped
    #[serde(rename = "cooldown-secs")]
    pub cooldown_secs: i64,

    /// Minimum hours between automatic hangout nudges
    #[serde(rename = "nudge-interval-hours")]
    pub nudge_interval_hours: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            plan_message_limit: 2,
            cooldown_secs: 60,
            nudge_interval_hours: 24,
        }
    }
}

/// Session state persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// JSON file holding every group session
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("state.json"),
        }
    }
}

/// A monitored group chat and its roster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Display name used in prompts
    pub name: String,

    /// Transport identifier of the group conversation
    #[serde(rename = "chat-id")]
    pub chat_id: String,

    /// Existing group-agent conversation handle, if one should be reused
    #[serde(rename = "thread-id", default)]
    pub thread_id: Option<String>,

    /// Days without a hangout before the group gets nudged
    #[serde(rename = "hangout-threshold-days", default = "default_threshold_days")]
    pub hangout_threshold_days: i64,

    /// Static roster
    #[serde(default)]
    pub members: Vec<Member>,
}

fn default_threshold_days() -> i64 {
    7
}

impl GroupConfig {
    /// Find a member by transport contact
    pub fn member(&self, contact: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.contact == contact)
    }

    /// Display name for a sender, falling back to the raw contact
    pub fn display_name<'a>(&'a self, contact: &'a str) -> &'a str {
        self.member(contact).map(|m| m.name.as_str()).unwrap_or(contact)
    }
}

/// A roster entry. Read-only for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub contact: String,
}

/// XDG data directory (~/.local/share/linkup on Linux)
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("linkup"))
        .unwrap_or_else(|| PathBuf::from(".linkup"))
}
