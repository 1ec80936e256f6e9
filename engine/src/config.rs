//! Configuration loading
//!
//! Loads configuration from `~/.config/usageguard/usageguard.toml` (or the
//! `USAGEGUARD_CONFIG` env var). Every key has a default, so a missing file
//! yields a runnable configuration.

use crate::classifier::Thresholds;
use crate::errors::{Result, UsageGuardError};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GuardConfig {
    /// Thresholds, limits and trusted actors
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Run-mode switches
    #[serde(default)]
    pub run: RunConfig,

    /// Input dataset locations
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Catalog API access
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Local output destinations
    #[serde(default)]
    pub output: OutputConfig,

    /// Report publication
    #[serde(default)]
    pub report: ReportConfig,
}

/// Protection policy
#[derive(Debug, Deserialize, Clone)]
pub struct PolicyConfig {
    /// Items used at or above this count must be protected
    #[serde(default = "default_usage_limit")]
    pub usage_limit: u64,

    /// Protected items used at or above this count are never lifted
    #[serde(default = "default_cooldown_limit")]
    pub cooldown_limit: u64,

    /// Skip the add pass entirely when more candidates than this exist
    #[serde(default = "default_add_limit")]
    pub add_limit: Option<usize>,

    /// Skip the lift pass entirely when more candidates than this exist
    #[serde(default = "default_lift_limit")]
    pub lift_limit: Option<usize>,

    /// Stop each pass after this many processed cases
    #[serde(default)]
    pub hard_limit: Option<usize>,

    /// Minimum number of subscribed projects required before adding
    #[serde(default)]
    pub min_subscribed_projects: Option<u64>,

    /// Actors whose protections may always be added or lifted
    #[serde(default = "default_trusted_actors")]
    pub trusted_actors: Vec<String>,
}

fn default_usage_limit() -> u64 {
    500
}

fn default_cooldown_limit() -> u64 {
    300
}

fn default_add_limit() -> Option<usize> {
    Some(1000)
}

fn default_lift_limit() -> Option<usize> {
    Some(100)
}

fn default_trusted_actors() -> Vec<String> {
    vec!["MsynABot".to_string()]
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            usage_limit: default_usage_limit(),
            cooldown_limit: default_cooldown_limit(),
            add_limit: default_add_limit(),
            lift_limit: default_lift_limit(),
            hard_limit: None,
            min_subscribed_projects: None,
            trusted_actors: default_trusted_actors(),
        }
    }
}

impl PolicyConfig {
    /// Validated threshold pair
    pub fn thresholds(&self) -> Result<Thresholds> {
        Thresholds::new(self.usage_limit, self.cooldown_limit)
    }

    /// Trusted actors as a lookup set
    pub fn trusted_actor_set(&self) -> BTreeSet<String> {
        self.trusted_actors.iter().cloned().collect()
    }
}

/// Run-mode switches
#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// Run every guard and counter but never call the mutation API
    #[serde(default)]
    pub simulate: bool,

    /// Pause after every real protection change
    #[serde(default = "default_post_mutation_delay_secs")]
    pub post_mutation_delay_secs: u64,
}

fn default_post_mutation_delay_secs() -> u64 {
    5
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            simulate: false,
            post_mutation_delay_secs: default_post_mutation_delay_secs(),
        }
    }
}

impl RunConfig {
    pub fn post_mutation_delay(&self) -> Duration {
        Duration::from_secs(self.post_mutation_delay_secs)
    }
}

/// Input dataset locations
#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    /// CSV publication of per-item usage counts
    #[serde(default = "default_ranking_url")]
    pub ranking_url: String,

    /// Local copy of the ranking feed, written before parsing
    #[serde(default = "default_ranking_cache_path")]
    pub ranking_cache_path: PathBuf,

    /// JSON array of identifiers that must never be protected
    #[serde(default = "default_deny_list_url")]
    pub deny_list_url: String,

    /// Tab-separated allow-list of protections predating the policy
    #[serde(default = "default_legacy_grants_path")]
    pub legacy_grants_path: PathBuf,

    /// SQLite snapshot of the protection log tables
    #[serde(default = "default_history_db_path")]
    pub history_db_path: PathBuf,
}

fn default_ranking_url() -> String {
    "https://analytics.wikimedia.org/published/datasets/wmde-analytics-engineering/wdcm/etl/wdcm_topItems.csv".to_string()
}

fn default_ranking_cache_path() -> PathBuf {
    PathBuf::from("./dataframe/wdcmToplist.txt")
}

fn default_deny_list_url() -> String {
    "https://www.wikidata.org/w/index.php?title=User:MsynABot/rfc-protect-blacklist.json&action=raw&ctype=application/json".to_string()
}

fn default_legacy_grants_path() -> PathBuf {
    PathBuf::from("./dataframe/earlyItemProtections.txt")
}

fn default_history_db_path() -> PathBuf {
    PathBuf::from("./replica/history.db")
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            ranking_url: default_ranking_url(),
            ranking_cache_path: default_ranking_cache_path(),
            deny_list_url: default_deny_list_url(),
            legacy_grants_path: default_legacy_grants_path(),
            history_db_path: default_history_db_path(),
        }
    }
}

/// Catalog API access
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    /// Action API endpoint
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,

    /// Name of the environment variable holding the bearer token
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Edit summary used when adding protection
    #[serde(default = "default_protect_reason")]
    pub protect_reason: String,

    /// Edit summary used when lifting protection
    #[serde(default = "default_unprotect_reason")]
    pub unprotect_reason: String,
}

fn default_api_endpoint() -> String {
    "https://www.wikidata.org/w/api.php".to_string()
}

fn default_access_token_env() -> String {
    "USAGEGUARD_ACCESS_TOKEN".to_string()
}

fn default_user_agent() -> String {
    format!("usageguard/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_protect_reason() -> String {
    "Highly used item: to be indefinitely semi-protected per \
     [[:d:Wikidata:Protection policy#Highly used items|\
     Wikidata:Protection policy#Highly used items]]; \
     please use [[Template:Edit request]] on the item talk page if you cannot edit this item"
        .to_string()
}

fn default_unprotect_reason() -> String {
    "Item is no longer highly used as per \
     [[:d:Wikidata:Protection policy#Highly used items|\
     Wikidata:Protection policy#Highly used items]]"
        .to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_endpoint: default_api_endpoint(),
            access_token_env: default_access_token_env(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            protect_reason: default_protect_reason(),
            unprotect_reason: default_unprotect_reason(),
        }
    }
}

/// Local output destinations
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Directory for intermediate dataset dumps (disabled when unset)
    #[serde(default)]
    pub dataset_dir: Option<PathBuf>,

    /// Report template with `{placeholder}` keys (built-in when unset)
    #[serde(default)]
    pub report_template: Option<PathBuf>,

    /// Rendered report destination
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,

    /// Directory for per-run log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default)]
    pub log_to_terminal: bool,

    #[serde(default = "default_log_to_file")]
    pub log_to_file: bool,
}

fn default_report_path() -> PathBuf {
    PathBuf::from("./report/report.txt")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./log")
}

fn default_log_to_file() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dataset_dir: None,
            report_template: None,
            report_path: default_report_path(),
            log_dir: default_log_dir(),
            log_to_terminal: false,
            log_to_file: default_log_to_file(),
        }
    }
}

/// Report publication
#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    /// Page receiving the rendered report; empty disables publication
    #[serde(default = "default_report_page")]
    pub page: String,

    #[serde(default = "default_edit_summary")]
    pub edit_summary: String,
}

fn default_report_page() -> String {
    "User:MsynABot/rfc-protect-report".to_string()
}

fn default_edit_summary() -> String {
    "update page protection management statistics #msynabot".to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            page: default_report_page(),
            edit_summary: default_edit_summary(),
        }
    }
}

impl GuardConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "USAGEGUARD_CONFIG";

    /// Default config filename
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "usageguard.toml";

    /// Load configuration
    ///
    /// Resolution order:
    /// 1. explicit path (the `--config` flag)
    /// 2. `USAGEGUARD_CONFIG` environment variable
    /// 3. `~/.config/usageguard/usageguard.toml`
    ///
    /// If the resolved file doesn't exist, returns default configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::resolve_config_path(),
        };

        if !path.exists() {
            if explicit.is_some() {
                return Err(UsageGuardError::config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            tracing::info!(path = %path.display(), "config not found, using defaults");
            let cfg = Self::default();
            cfg.validate()?;
            return Ok(cfg);
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            UsageGuardError::config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: GuardConfig = toml::from_str(contents)
            .map_err(|e| UsageGuardError::config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("usageguard")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.policy.thresholds()?;

        if self.policy.hard_limit == Some(0) {
            return Err(UsageGuardError::config(
                "policy.hard_limit must be at least 1; leave it unset for no cap",
            ));
        }

        if self.policy.trusted_actors.is_empty() {
            tracing::warn!("no trusted actors configured; only legacy grants can be lifted");
        }

        if self.report.page.trim().is_empty() {
            tracing::info!("report page is empty; report publication disabled");
        }

        Ok(())
    }

    /// Whether a report page is configured
    pub fn publishes_report(&self) -> bool {
        !self.report.page.trim().is_empty()
    }
}
