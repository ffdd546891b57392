// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates intervals, timezone and agent names; provides defaults for everything else
use crate::mentions::SYSTEM;
use crate::paths;
use crate::registry::validate_agent_name;
use crate::router::EmptyMentionPolicy;
use anyhow::{Context, Result};
use parley_agent::{BackendConfig, ModelSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Model collaborator; agents with the llm backend need it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSettings>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Shown in the console banner
    #[serde(default = "default_chat_name")]
    pub name: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub empty_mentions: EmptyMentionPolicy,
    /// Added to the receivers of every console message
    #[serde(default = "default_recipient")]
    pub default_recipient: String,
    #[serde(default)]
    pub log_messages: bool,
    /// Persona for the built-in system agent's chat replies; empty keeps the default
    #[serde(default)]
    pub system_instructions: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            name: default_chat_name(),
            poll_interval_ms: default_poll_interval_ms(),
            empty_mentions: EmptyMentionPolicy::default(),
            default_recipient: default_recipient(),
            log_messages: false,
            system_instructions: String::new(),
        }
    }
}

impl ChatConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_chat_name() -> String {
    "parley".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_recipient() -> String {
    SYSTEM.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Timezone for interpreting reminder times (e.g., "America/Chicago", "UTC")
    /// Uses IANA timezone names. Defaults to system local timezone.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Markdown file mirroring time reminders; unset keeps reminders in memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminders_file: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            timezone: default_timezone(),
            reminders_file: None,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Parsed timezone; `Config::load` has already validated it
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| anyhow::anyhow!("Invalid timezone '{}'", self.timezone))
    }

    pub fn reminders_path(&self) -> Option<PathBuf> {
        self.reminders_file
            .as_deref()
            .map(|p| PathBuf::from(expand_tilde(p)))
    }
}

fn default_tick_secs() -> u64 {
    1
}

fn default_timezone() -> String {
    // Try to detect system timezone, fall back to UTC
    if let Ok(tz) = std::env::var("TZ") {
        if tz.parse::<chrono_tz::Tz>().is_ok() {
            return tz;
        }
    }
    // On Unix systems, try to read /etc/localtime symlink
    #[cfg(unix)]
    {
        if let Ok(link) = std::fs::read_link("/etc/localtime") {
            if let Some(tz) = link.to_str() {
                // Path like /usr/share/zoneinfo/America/Chicago
                if let Some(pos) = tz.find("zoneinfo/") {
                    let detected = tz[pos + 9..].to_string();
                    if detected.parse::<chrono_tz::Tz>().is_ok() {
                        return detected;
                    }
                }
            }
        }
    }
    "UTC".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus listener address; unset disables the exporter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    /// System instructions for llm agents
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Expand tilde (~) to home directory in paths
fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        }
        tracing::warn!(
            path = %path,
            "Failed to expand tilde in path: could not determine home directory"
        );
    }
    path.to_string()
}

fn parse_env<T: std::str::FromStr>(key: &str, val: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    val.parse::<T>()
        .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, val, e))
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. PARLEY_CONFIG_PATH env var (if set)
    /// 2. ./parley.toml (current directory)
    /// 3. ~/.config/parley/parley.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("PARLEY_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("parley.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Parse TOML without env overrides, then validate
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load one file with env overrides applied
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config = toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    /// Searches: PARLEY_CONFIG_PATH, ./parley.toml, then the XDG config file.
    pub fn load() -> Result<Self> {
        let mut config = if let Some(config_path) = Self::find_config_file() {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("PARLEY_POLL_INTERVAL_MS") {
            self.chat.poll_interval_ms = parse_env("PARLEY_POLL_INTERVAL_MS", &val)?;
        }
        if let Ok(val) = std::env::var("PARLEY_EMPTY_MENTIONS") {
            self.chat.empty_mentions = parse_env("PARLEY_EMPTY_MENTIONS", &val)?;
        }
        if let Ok(val) = std::env::var("PARLEY_DEFAULT_RECIPIENT") {
            self.chat.default_recipient = val;
        }
        if let Ok(val) = std::env::var("SCHEDULER_TIMEZONE") {
            self.scheduler.timezone = val;
        }
        if let Ok(val) = std::env::var("SCHEDULER_TICK_SECS") {
            self.scheduler.tick_secs = parse_env("SCHEDULER_TICK_SECS", &val)?;
        }
        if let Ok(val) = std::env::var("REMINDERS_FILE") {
            self.scheduler.reminders_file = Some(val);
        }
        if let Ok(val) = std::env::var("METRICS_LISTEN") {
            self.metrics.listen = Some(parse_env("METRICS_LISTEN", &val)?);
        }

        // Any model variable turns the model collaborator on
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.model.get_or_insert_with(ModelSettings::default).api_key = Some(val);
        }
        if let Ok(val) = std::env::var("OPENAI_BASE_URL") {
            self.model.get_or_insert_with(ModelSettings::default).base_url = val;
        }
        if let Ok(val) = std::env::var("PARLEY_MODEL") {
            self.model.get_or_insert_with(ModelSettings::default).model = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.timezone.parse::<chrono_tz::Tz>().is_err() {
            anyhow::bail!(
                "Invalid timezone '{}'. Use IANA timezone names like \
                 'America/Chicago', 'Europe/London', 'UTC'",
                self.scheduler.timezone
            );
        }
        if self.chat.poll_interval_ms == 0 {
            anyhow::bail!("chat.poll_interval_ms must be greater than 0");
        }
        if self.scheduler.tick_secs == 0 {
            anyhow::bail!("scheduler.tick_secs must be greater than 0");
        }
        validate_agent_name(&self.chat.default_recipient)
            .context("chat.default_recipient must be a valid agent name")?;

        let mut seen = HashSet::new();
        for agent in &self.agents {
            validate_agent_name(&agent.name)
                .with_context(|| format!("Invalid [[agents]] entry '{}'", agent.name))?;
            if !seen.insert(agent.name.as_str()) {
                anyhow::bail!("Agent '{}' is configured more than once", agent.name);
            }
        }
        Ok(())
    }

    /// Whether an `[[agents]]` entry takes the default recipient's name
    pub fn overrides_default_recipient(&self) -> bool {
        self.agents
            .iter()
            .any(|a| a.name == self.chat.default_recipient)
    }
}
