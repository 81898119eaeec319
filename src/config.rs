//! Configuration system for the Eliza daemon
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (ELIZA_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Domain, ImpactTier};

/// Upper bound on decisions replayed into a reasoning prompt
pub const MAX_HISTORY_LIMIT: usize = 50;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Cycle timing and identity
    pub daemon: DaemonSettings,

    /// Impact classification and coordination triggers
    pub impact: ImpactSettings,

    /// Performance ledger and auto-suspension policy
    pub ledger: LedgerSettings,

    /// Monitoring connectors
    pub connectors: ConnectorSettings,

    /// Reasoning service
    pub reasoning: ReasoningSettings,

    /// Outbound action executors
    pub actions: ActionSettings,

    /// Cycle summary notifications
    pub notifications: NotificationSettings,

    /// Logging configuration
    pub logging: LoggingSettings,

    /// Data storage paths
    pub storage: StorageSettings,
}

/// Daemon identity and cycle timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// Human-readable daemon name (defaults to the hostname)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Seconds between cycle starts
    pub cycle_period_secs: u64,

    /// Maximum deliberation time for a coordination session
    pub deliberation_timeout_secs: u64,

    /// Per-call timeout for the reasoning service
    pub reasoning_timeout_secs: u64,

    /// Maximum concurrent reasoning calls per cycle
    pub max_concurrent_reasoning: usize,
}

/// Per-domain impact thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainImpact {
    /// Amount above which an observation is at least high impact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_impact_amount: Option<f64>,

    /// Tier at or above which multi-persona approval is required
    pub coordination_tier: ImpactTier,
}

/// Impact classification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactSettings {
    pub social: DomainImpact,
    pub mining: DomainImpact,
    pub governance: DomainImpact,

    /// Observation tags that always require coordination
    pub coordination_tags: Vec<String>,

    /// Add active compliance personas to every coordination session
    pub include_compliance: bool,
}

/// Performance ledger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Rolling window length in days
    pub window_days: u32,

    /// Success rate below which a persona is suspended
    pub suspension_threshold: f64,

    /// Minimum outcomes inside the window before suspension can fire
    pub min_samples: usize,
}

/// A single HTTP feed endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    /// Endpoint URL (unset = disabled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Monitoring connector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorSettings {
    /// Per-connector poll timeout in milliseconds
    pub timeout_ms: u64,

    pub social: EndpointSettings,
    pub mining: EndpointSettings,
    pub governance: EndpointSettings,
}

/// Reasoning service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningSettings {
    /// Provider: "openai" (any OpenAI-compatible API) or "mock"
    pub provider: String,

    /// API base URL (e.g., "https://api.openai.com/v1", "http://localhost:11434/v1")
    pub base_url: String,

    /// API key (empty string for local servers)
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// HTTP request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum retries on transient failures
    pub max_retries: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Recent decisions of the asking persona included in each prompt (0 disables)
    pub history_limit: usize,
}

/// Outbound action executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSettings {
    /// Log actions instead of calling the endpoints
    pub dry_run: bool,

    pub reward: EndpointSettings,
    pub proposal: EndpointSettings,
    pub notification: EndpointSettings,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

/// Cycle summary notification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Discord-style webhook (unset = log only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

/// Storage path settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Base data directory for the document store
    pub data_dir: String,
}

// Default implementations

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            name: None,
            cycle_period_secs: 600,
            deliberation_timeout_secs: 600,
            reasoning_timeout_secs: 60,
            max_concurrent_reasoning: 8,
        }
    }
}

impl Default for DomainImpact {
    fn default() -> Self {
        Self {
            high_impact_amount: None,
            coordination_tier: ImpactTier::High,
        }
    }
}

impl Default for ImpactSettings {
    fn default() -> Self {
        Self {
            social: DomainImpact::default(),
            mining: DomainImpact {
                high_impact_amount: Some(1000.0),
                coordination_tier: ImpactTier::High,
            },
            governance: DomainImpact {
                high_impact_amount: Some(10000.0),
                coordination_tier: ImpactTier::High,
            },
            coordination_tags: vec![
                "regulatory_compliance".to_string(),
                "compliance".to_string(),
                "legal".to_string(),
            ],
            include_compliance: true,
        }
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            window_days: 7,
            suspension_threshold: 0.5,
            min_samples: 20,
        }
    }
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 15000,
            social: EndpointSettings::default(),
            mining: EndpointSettings::default(),
            governance: EndpointSettings::default(),
        }
    }
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: String::new(),
            model: "llama3".to_string(),
            timeout_secs: 60,
            max_retries: 2,
            temperature: 0.2,
            history_limit: 5,
        }
    }
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            dry_run: true,
            reward: EndpointSettings::default(),
            proposal: EndpointSettings::default(),
            notification: EndpointSettings::default(),
            timeout_ms: 15000,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.eliza/data".to_string(),
        }
    }
}

impl ImpactSettings {
    pub fn for_domain(&self, domain: Domain) -> &DomainImpact {
        match domain {
            Domain::Social => &self.social,
            Domain::Mining => &self.mining,
            Domain::Governance => &self.governance,
        }
    }
}

impl ConnectorSettings {
    pub fn for_domain(&self, domain: Domain) -> &EndpointSettings {
        match domain {
            Domain::Social => &self.social,
            Domain::Mining => &self.mining,
            Domain::Governance => &self.governance,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse a configuration file without overrides or validation
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: format!("{}: {}", path.display(), e.message()),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    pub fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::ConfigNotFound { path });
        }

        if let Ok(path) = std::env::var("ELIZA_CONFIG") {
            let path = PathBuf::from(expand_path(&path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::ConfigNotFound { path });
        }

        let search_paths = [
            // Current directory
            Some(PathBuf::from("eliza-daemon.toml")),
            // User config directory
            dirs::config_dir().map(|p| p.join("eliza").join("daemon.toml")),
            // Home directory
            dirs::home_dir().map(|p| p.join(".eliza").join("daemon.toml")),
            // System config (Linux)
            Some(PathBuf::from("/etc/eliza/daemon.toml")),
        ];

        for path in search_paths.iter().flatten() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Daemon settings
        if let Ok(val) = std::env::var("ELIZA_NAME") {
            self.daemon.name = Some(val);
        }
        env_parse("ELIZA_CYCLE_PERIOD_SECS", &mut self.daemon.cycle_period_secs);
        env_parse(
            "ELIZA_DELIBERATION_TIMEOUT_SECS",
            &mut self.daemon.deliberation_timeout_secs,
        );
        env_parse(
            "ELIZA_REASONING_TIMEOUT_SECS",
            &mut self.daemon.reasoning_timeout_secs,
        );
        env_parse(
            "ELIZA_MAX_CONCURRENT_REASONING",
            &mut self.daemon.max_concurrent_reasoning,
        );

        // Ledger settings
        env_parse("ELIZA_LEDGER_WINDOW_DAYS", &mut self.ledger.window_days);
        env_parse(
            "ELIZA_SUSPENSION_THRESHOLD",
            &mut self.ledger.suspension_threshold,
        );
        env_parse("ELIZA_SUSPENSION_MIN_SAMPLES", &mut self.ledger.min_samples);

        // Connector settings
        env_parse("ELIZA_CONNECTOR_TIMEOUT_MS", &mut self.connectors.timeout_ms);
        if let Ok(val) = std::env::var("ELIZA_SOCIAL_URL") {
            self.connectors.social.url = Some(val);
        }
        if let Ok(val) = std::env::var("ELIZA_MINING_URL") {
            self.connectors.mining.url = Some(val);
        }
        if let Ok(val) = std::env::var("ELIZA_GOVERNANCE_URL") {
            self.connectors.governance.url = Some(val);
        }

        // Reasoning settings
        if let Ok(val) = std::env::var("ELIZA_REASONING_PROVIDER") {
            self.reasoning.provider = val;
        }
        if let Ok(val) = std::env::var("ELIZA_REASONING_BASE_URL") {
            self.reasoning.base_url = val;
        }
        if let Ok(val) = std::env::var("ELIZA_REASONING_API_KEY") {
            self.reasoning.api_key = val;
        }
        if let Ok(val) = std::env::var("ELIZA_REASONING_MODEL") {
            self.reasoning.model = val;
        }
        env_parse("ELIZA_REASONING_HISTORY_LIMIT", &mut self.reasoning.history_limit);

        // Action settings
        if let Ok(val) = std::env::var("ELIZA_DRY_RUN") {
            self.actions.dry_run = parse_bool(&val);
        }

        // Notifications
        if let Ok(val) = std::env::var("ELIZA_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(val);
        }

        // Logging settings
        if let Ok(val) = std::env::var("ELIZA_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("ELIZA_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("ELIZA_LOG_JSON") {
            self.logging.json_format = parse_bool(&val);
        }

        // Storage settings
        if let Ok(val) = std::env::var("ELIZA_DATA_DIR") {
            self.storage.data_dir = val;
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        self.storage.data_dir = expand_path(&self.storage.data_dir);

        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.daemon.cycle_period_secs == 0 {
            return Err(Error::config_field_invalid(
                "daemon.cycle_period_secs",
                "cycle period must be greater than zero",
            ));
        }
        if self.daemon.deliberation_timeout_secs == 0
            || self.daemon.deliberation_timeout_secs > self.daemon.cycle_period_secs
        {
            return Err(Error::config_field_invalid(
                "daemon.deliberation_timeout_secs",
                "deliberation timeout must be between 1 and the cycle period",
            ));
        }
        if self.daemon.reasoning_timeout_secs == 0 {
            return Err(Error::config_field_invalid(
                "daemon.reasoning_timeout_secs",
                "reasoning timeout must be greater than zero",
            ));
        }
        if self.daemon.max_concurrent_reasoning == 0 {
            return Err(Error::config_field_invalid(
                "daemon.max_concurrent_reasoning",
                "at least one concurrent reasoning call is required",
            ));
        }

        // Ledger policy
        if !(0.0..=1.0).contains(&self.ledger.suspension_threshold) {
            return Err(Error::config_field_invalid(
                "ledger.suspension_threshold",
                "suspension threshold must be between 0.0 and 1.0",
            ));
        }
        if self.ledger.window_days == 0 {
            return Err(Error::config_field_invalid(
                "ledger.window_days",
                "window must be at least one day",
            ));
        }

        for domain in Domain::all() {
            if let Some(amount) = self.impact.for_domain(*domain).high_impact_amount {
                if !amount.is_finite() || amount < 0.0 {
                    return Err(Error::config_field_invalid(
                        format!("impact.{}.high_impact_amount", domain),
                        "threshold must be a non-negative number",
                    ));
                }
            }
        }

        if self.connectors.timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "connectors.timeout_ms",
                "connector timeout must be greater than zero",
            ));
        }

        // Validate URLs
        let mut urls: BTreeMap<String, &str> = BTreeMap::new();
        for domain in Domain::all() {
            if let Some(url) = self.connectors.for_domain(*domain).url.as_deref() {
                urls.insert(format!("connectors.{}.url", domain), url);
            }
        }
        if let Some(url) = self.actions.reward.url.as_deref() {
            urls.insert("actions.reward.url".to_string(), url);
        }
        if let Some(url) = self.actions.proposal.url.as_deref() {
            urls.insert("actions.proposal.url".to_string(), url);
        }
        if let Some(url) = self.actions.notification.url.as_deref() {
            urls.insert("actions.notification.url".to_string(), url);
        }
        if let Some(url) = self.notifications.webhook_url.as_deref() {
            urls.insert("notifications.webhook_url".to_string(), url);
        }
        for (field, url) in urls {
            validate_http_url(&field, url)?;
        }

        let providers = ["openai", "mock"];
        if !providers.contains(&self.reasoning.provider.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "reasoning.provider",
                format!(
                    "Invalid provider '{}'. Must be one of: {}",
                    self.reasoning.provider,
                    providers.join(", ")
                ),
            ));
        }
        if self.reasoning.provider.eq_ignore_ascii_case("openai") {
            validate_http_url("reasoning.base_url", &self.reasoning.base_url)?;
        }
        if self.reasoning.history_limit > MAX_HISTORY_LIMIT {
            return Err(Error::config_field_invalid(
                "reasoning.history_limit",
                format!("at most {} recent decisions may be included", MAX_HISTORY_LIMIT),
            ));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Daemon name, falling back to the hostname
    pub fn daemon_name(&self) -> String {
        self.daemon.name.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "eliza".to_string())
        })
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs(self.daemon.cycle_period_secs)
    }

    pub fn deliberation_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon.deliberation_timeout_secs)
    }

    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon.reasoning_timeout_secs)
    }

    pub fn connector_timeout(&self) -> Duration {
        Duration::from_millis(self.connectors.timeout_ms)
    }

    /// Get the data directory as a PathBuf
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(val) = std::env::var(key) {
        if let Ok(n) = val.parse() {
            *target = n;
        }
    }
}

fn parse_bool(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    let url = url::Url::parse(value).map_err(|e| {
        Error::config_field_invalid(field, format!("invalid URL '{}': {}", value, e))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(Error::config_field_invalid(
            field,
            format!("URL must use http or https, got '{}'", scheme),
        )),
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".eliza")
                .join("daemon.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::config_validation(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# Eliza Daemon Configuration

[daemon]
# Daemon name (defaults to the hostname)
# name = "eliza-main"

# Seconds between cycle starts
cycle_period_secs = 600

# Maximum deliberation per coordination session (must not exceed the cycle period)
deliberation_timeout_secs = 600

# Per-call reasoning timeout
reasoning_timeout_secs = 60

# Maximum concurrent reasoning calls
max_concurrent_reasoning = 8

[impact]
# Tags that always require multi-persona coordination
coordination_tags = ["regulatory_compliance", "compliance", "legal"]

# Add active compliance personas to every coordination session
include_compliance = true

[impact.social]
coordination_tier = "high"

[impact.mining]
# Reward amounts above this are at least high impact
high_impact_amount = 1000.0
coordination_tier = "high"

[impact.governance]
high_impact_amount = 10000.0
coordination_tier = "high"

[ledger]
# Rolling window for success rates
window_days = 7

# Suspend personas whose success rate drops below this
suspension_threshold = 0.5

# Minimum outcomes in the window before suspension applies
min_samples = 20

[connectors]
# Per-connector poll timeout in milliseconds
timeout_ms = 15000

# [connectors.social]
# url = "https://feeds.example.org/social"
# token = ""

# [connectors.mining]
# url = "https://feeds.example.org/mining"

# [connectors.governance]
# url = "https://feeds.example.org/governance"

[reasoning]
# Provider: openai (any OpenAI-compatible API) or mock
provider = "openai"
base_url = "http://localhost:11434/v1"
api_key = ""
model = "llama3"
timeout_secs = 60
max_retries = 2
temperature = 0.2

# Recent decisions of the asking persona shown in each prompt (0 disables)
history_limit = 5

[actions]
# Log actions instead of calling executor endpoints
dry_run = true
timeout_ms = 15000

# [actions.reward]
# url = "https://treasury.example.org/rewards"

# [actions.proposal]
# url = "https://governance.example.org/proposals"

# [actions.notification]
# url = "https://hooks.example.org/notify"

[notifications]
# Discord-style webhook for cycle summaries (comment out to log only)
# webhook_url = "https://discord.com/api/webhooks/..."

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.eliza/logs/daemon.log"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false

[storage]
# Document store directory
data_dir = "~/.eliza/data"
"#
    .to_string()
}
