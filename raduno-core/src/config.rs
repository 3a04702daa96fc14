// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields (wallet key, factory address) and provides defaults for the rest
use crate::abi;
use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub xmtp: XmtpConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct XmtpConfig {
    /// Hex private key the bridge signs with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_key: Option<String>,
    /// Network selector: "local", "dev", or "production"
    #[serde(default = "default_xmtp_env")]
    pub env: String,
    /// Bridge-side message database path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
}

// Custom Debug impl to redact sensitive fields
impl std::fmt::Debug for XmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmtpConfig")
            .field("wallet_key", &self.wallet_key.as_ref().map(|_| "[REDACTED]"))
            .field("env", &self.env)
            .field("db_path", &self.db_path)
            .field("bridge_url", &self.bridge_url)
            .finish()
    }
}

impl Default for XmtpConfig {
    fn default() -> Self {
        Self {
            wallet_key: None,
            env: default_xmtp_env(),
            db_path: None,
            bridge_url: default_bridge_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory_address: Option<String>,
    #[serde(default = "default_registry_address")]
    pub registry_address: String,
    /// Parent name for event labels, e.g. `hack.raduno.eth`
    #[serde(default = "default_root_domain")]
    pub root_domain: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            factory_address: None,
            registry_address: default_registry_address(),
            root_domain: default_root_domain(),
            chain_id: default_chain_id(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend name in the completion registry: "openai" or "mock"
    #[serde(default = "default_llm_backend")]
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// OpenAI-compatible base URL override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_intent_temperature")]
    pub intent_temperature: f32,
    #[serde(default = "default_selection_temperature")]
    pub selection_temperature: f32,
    #[serde(default = "default_recommend_temperature")]
    pub recommend_temperature: f32,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("backend", &self.backend)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("intent_temperature", &self.intent_temperature)
            .field("selection_temperature", &self.selection_temperature)
            .field("recommend_temperature", &self.recommend_temperature)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: default_llm_backend(),
            api_key: None,
            model: default_llm_model(),
            endpoint: None,
            intent_temperature: default_intent_temperature(),
            selection_temperature: default_selection_temperature(),
            recommend_temperature: default_recommend_temperature(),
        }
    }
}

impl LlmConfig {
    /// Whether completions can be requested at all
    pub fn is_enabled(&self) -> bool {
        self.backend == "mock"
            || self
                .api_key
                .as_deref()
                .map(|k| !k.trim().is_empty())
                .unwrap_or(false)
    }

    /// JSON config handed to the backend factory
    pub fn backend_config(&self) -> serde_json::Value {
        let mut value = serde_json::json!({ "model": self.model });
        if let Some(key) = &self.api_key {
            value["api_key"] = serde_json::Value::String(key.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            value["endpoint"] = serde_json::Value::String(endpoint.clone());
        }
        value
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,
    /// Create groups with a single reachable member (otherwise two are required)
    #[serde(default)]
    pub allow_small_groups: bool,
    /// Deadline for each chain, transport, or completion call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval_secs(),
            allow_small_groups: false,
            call_timeout_secs: default_call_timeout_secs(),
            database_path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Frontend base URL for `/events/<label>` links
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Hostname shown in wallet transaction metadata
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Fee-sponsorship endpoint attached to registration calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_url: Option<String>,
    /// When the model names no known event, register for the first listed event
    #[serde(default = "default_true")]
    pub fallback_to_first_event: bool,
    #[serde(default = "default_explorer_url")]
    pub explorer_url: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            hostname: default_hostname(),
            paymaster_url: None,
            fallback_to_first_event: true,
            explorer_url: default_explorer_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics on this port when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

fn default_xmtp_env() -> String {
    "dev".to_string()
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:5555".to_string()
}

fn default_rpc_url() -> String {
    "https://mainnet.base.org".to_string()
}

fn default_registry_address() -> String {
    "0xC02f3b4CbE3431a46A19416211AeE7F004d829C3".to_string()
}

fn default_root_domain() -> String {
    "raduno.eth".to_string()
}

fn default_chain_id() -> u64 {
    8453 // Base mainnet
}

fn default_llm_backend() -> String {
    "openai".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_intent_temperature() -> f32 {
    0.1
}

fn default_selection_temperature() -> f32 {
    0.3
}

fn default_recommend_temperature() -> f32 {
    0.7
}

fn default_sync_interval_secs() -> u64 {
    30
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_database_path() -> String {
    "./group-mappings.db".to_string()
}

fn default_base_url() -> String {
    "https://raduno.reza.dev".to_string()
}

fn default_hostname() -> String {
    "raduno.reza.dev".to_string()
}

fn default_explorer_url() -> String {
    "https://basescan.org/tx".to_string()
}

fn default_true() -> bool {
    true
}

fn parse_flag(name: &str, val: &str) -> Result<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => anyhow::bail!("{} must be true or false, got: {}", name, val),
    }
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

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. RADUNO_CONFIG_PATH env var (if set)
    /// 2. ./raduno.toml (current directory - for development)
    /// 3. ~/.config/raduno/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("RADUNO_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("raduno.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from file with environment variable overrides.
    ///
    /// Fails when the wallet key or factory address is missing.
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
        if let Ok(val) = std::env::var("XMTP_WALLET_KEY") {
            self.xmtp.wallet_key = Some(val);
        }
        if let Ok(val) = std::env::var("XMTP_ENV") {
            self.xmtp.env = val;
        }
        if let Ok(val) = std::env::var("XMTP_DB_PATH") {
            self.xmtp.db_path = Some(val);
        }
        if let Ok(val) = std::env::var("XMTP_BRIDGE_URL") {
            self.xmtp.bridge_url = val;
        }
        if let Ok(val) = std::env::var("BASE_RPC_URL") {
            self.chain.rpc_url = val;
        }
        if let Ok(val) = std::env::var("FACTORY_CONTRACT_ADDRESS") {
            self.chain.factory_address = Some(val);
        }
        if let Ok(val) = std::env::var("L2_REGISTRY_ADDRESS") {
            self.chain.registry_address = val;
        }
        if let Ok(val) = std::env::var("ROOT_DOMAIN") {
            self.chain.root_domain = val;
        }
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.llm.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("OPENAI_MODEL") {
            self.llm.model = val;
        }
        if let Ok(val) = std::env::var("GROUP_DB_PATH") {
            self.sync.database_path = val;
        }
        if let Ok(val) = std::env::var("SYNC_INTERVAL_SECS") {
            self.sync.interval_secs = val.parse().with_context(|| {
                format!("SYNC_INTERVAL_SECS must be a valid number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("ALLOW_SMALL_GROUPS") {
            self.sync.allow_small_groups = parse_flag("ALLOW_SMALL_GROUPS", &val)?;
        }
        if let Ok(val) = std::env::var("CALL_TIMEOUT_SECS") {
            self.sync.call_timeout_secs = val.parse().with_context(|| {
                format!("CALL_TIMEOUT_SECS must be a valid number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("PAYMASTER_URL") {
            self.assistant.paymaster_url = Some(val);
        }
        if let Ok(val) = std::env::var("EVENTS_BASE_URL") {
            self.assistant.base_url = val;
        }
        if let Ok(val) = std::env::var("METRICS_PORT") {
            self.metrics.port = Some(val.parse().with_context(|| {
                format!("METRICS_PORT must be a valid port number, got: {}", val)
            })?);
        }

        self.sync.database_path = expand_tilde(&self.sync.database_path);
        if let Some(db_path) = &self.xmtp.db_path {
            self.xmtp.db_path = Some(expand_tilde(db_path));
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let wallet_key = self.xmtp.wallet_key.as_deref().map(str::trim).unwrap_or("");
        if wallet_key.is_empty() {
            anyhow::bail!(
                "xmtp.wallet_key is required (set in raduno.toml or XMTP_WALLET_KEY env var)"
            );
        }

        let factory = self
            .chain
            .factory_address
            .as_deref()
            .map(str::trim)
            .unwrap_or("");
        if factory.is_empty() {
            anyhow::bail!(
                "chain.factory_address is required (set in raduno.toml or FACTORY_CONTRACT_ADDRESS env var)"
            );
        }
        if !abi::is_address(factory) {
            anyhow::bail!("chain.factory_address is not a valid address: {}", factory);
        }
        self.chain.factory_address = Some(factory.to_lowercase());

        if !abi::is_address(self.chain.registry_address.trim()) {
            anyhow::bail!(
                "chain.registry_address is not a valid address: {}",
                self.chain.registry_address
            );
        }
        if self.sync.interval_secs == 0 {
            anyhow::bail!("sync.interval_secs must be greater than zero");
        }
        if self.sync.call_timeout_secs == 0 {
            anyhow::bail!("sync.call_timeout_secs must be greater than zero");
        }

        if !self.llm.is_enabled() {
            tracing::warn!("OPENAI_API_KEY not set - DM event recommendations will be disabled");
        }
        Ok(())
    }

    /// Factory address after validation
    pub fn factory_address(&self) -> Result<&str> {
        self.chain
            .factory_address
            .as_deref()
            .context("chain.factory_address is not configured")
    }
}
