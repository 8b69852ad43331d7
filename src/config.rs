use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

use crate::models::StoreTarget;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub dashboard: DashboardConfig,
    pub stores: Vec<StoreTarget>,
    pub notifications: NotificationsConfig,
    pub retry: RetryConfig,
    pub browser: BrowserConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub schedule: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub login_url: String,
    pub email: String,
    pub password: String,
    pub otp_secret: String,
    /// Re-login proactively once a session is older than this.
    pub session_max_age_mins: Option<u64>,
    /// Keep the browser cookies after login and try them before logging in again.
    pub reuse_saved_session: bool,
    pub selectors: LoginSelectors,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_url: "https://sellercentral.amazon.co.uk/ap/signin".to_string(),
            email: String::new(),
            password: String::new(),
            otp_secret: String::new(),
            session_max_age_mins: None,
            reuse_saved_session: true,
            selectors: LoginSelectors::default(),
        }
    }
}

// Credentials never reach the logs.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("login_url", &self.login_url)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("otp_secret", &"<redacted>")
            .field("session_max_age_mins", &self.session_max_age_mins)
            .field("reuse_saved_session", &self.reuse_saved_session)
            .field("selectors", &self.selectors)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSelectors {
    pub email_field: String,
    pub interstitial_continue: String,
    pub email_continue: String,
    pub password_field: String,
    pub sign_in_button: String,
    pub otp_field: String,
    pub otp_submit: String,
    pub auth_error: String,
    pub landing_markers: Vec<String>,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            email_field: "input#ap_email".to_string(),
            interstitial_continue: r#"input[type="submit"][aria-labelledby="continue-announce"]"#.to_string(),
            email_continue: "input#continue".to_string(),
            password_field: "input#ap_password".to_string(),
            sign_in_button: "input#signInSubmit".to_string(),
            otp_field: r#"input[id*="otp"]"#.to_string(),
            otp_submit: "input#auth-signin-button".to_string(),
            auth_error: "#auth-error-message-box".to_string(),
            landing_markers: vec![
                "#dashboard-title-component-id".to_string(),
                "#range-selector".to_string(),
                ".picker-app".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub base_url: String,
    pub metrics_path: String,
    pub inventory_path: String,
    pub selectors: DashboardSelectors,
    pub metrics_columns: MetricsColumns,
    pub inventory_columns: InventoryColumns,
    pub inventory_limit: usize,
    pub thumbnail_size: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sellercentral.amazon.co.uk".to_string(),
            metrics_path: "/snowdash".to_string(),
            inventory_path: "/snow-inventory/inventoryinsights/ref=xx_infr_dnav_xx".to_string(),
            selectors: DashboardSelectors::default(),
            metrics_columns: MetricsColumns::default(),
            inventory_columns: InventoryColumns::default(),
            inventory_limit: 5,
            thumbnail_size: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSelectors {
    pub dashboard_marker: String,
    pub customise_button: String,
    pub date_start_input: String,
    pub date_end_input: String,
    pub apply_button: String,
    pub metrics_table: String,
    pub inventory_marker: String,
    pub inventory_sort: String,
    pub inventory_table: String,
    pub inventory_row: String,
}

impl Default for DashboardSelectors {
    fn default() -> Self {
        Self {
            dashboard_marker: "#dashboard-title-component-id".to_string(),
            customise_button: "#date-range-customise".to_string(),
            date_start_input: r#"kat-date-range-picker input[name="start"]"#.to_string(),
            date_end_input: r#"kat-date-range-picker input[name="end"]"#.to_string(),
            apply_button: "#date-range-apply".to_string(),
            metrics_table: "#shopper-metrics-table table".to_string(),
            inventory_marker: "#range-selector".to_string(),
            inventory_sort: "#sort-3".to_string(),
            inventory_table: "table.imp-table tbody".to_string(),
            inventory_row: "table.imp-table tbody tr".to_string(),
        }
    }
}

/// Zero-based column positions of the per-shopper table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsColumns {
    pub name: usize,
    pub orders: usize,
    pub units: usize,
    pub pick_time_secs: usize,
    pub requested_units: usize,
    pub inf_rate: usize,
    pub late_rate: usize,
}

impl Default for MetricsColumns {
    fn default() -> Self {
        Self {
            name: 0,
            orders: 1,
            units: 2,
            pick_time_secs: 3,
            requested_units: 4,
            inf_rate: 5,
            late_rate: 6,
        }
    }
}

impl MetricsColumns {
    pub fn width(&self) -> usize {
        [
            self.name,
            self.orders,
            self.units,
            self.pick_time_secs,
            self.requested_units,
            self.inf_rate,
            self.late_rate,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

/// Zero-based column positions of the items-not-found table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryColumns {
    pub image: usize,
    pub sku: usize,
    pub product_name: usize,
    pub inf_units: usize,
    pub orders_impacted: usize,
    pub inf_rate: usize,
}

impl Default for InventoryColumns {
    fn default() -> Self {
        Self {
            image: 0,
            sku: 1,
            product_name: 2,
            inf_units: 3,
            orders_impacted: 4,
            inf_rate: 8,
        }
    }
}

impl InventoryColumns {
    pub fn width(&self) -> usize {
        [
            self.image,
            self.sku,
            self.product_name,
            self.inf_units,
            self.orders_impacted,
            self.inf_rate,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub store_webhook_url: Option<String>,
    pub summary_webhook_url: Option<String>,
    pub request_timeout_secs: u64,
    pub post_delay_ms: u64,
    pub summary_title: String,
    pub uph_target: f64,
    pub late_rate_max: f64,
    pub inf_rate_max: f64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            store_webhook_url: None,
            summary_webhook_url: None,
            request_timeout_secs: 30,
            post_delay_ms: 1000,
            summary_title: "Amazon North West Summary".to_string(),
            uph_target: 80.0,
            late_rate_max: 3.0,
            inf_rate_max: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    #[default]
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStrategy {
    /// One login shared by every store of a run.
    #[default]
    Reuse,
    /// Fresh login before each store.
    PerStore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff: Backoff,
    pub jitter: bool,
    pub store_timeout_secs: u64,
    pub session_strategy: SessionStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5000,
            max_delay_ms: 60_000,
            backoff: Backoff::Linear,
            jitter: false,
            store_timeout_secs: 600,
            session_strategy: SessionStrategy::Reuse,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub page_timeout_ms: u64,
    pub wait_timeout_ms: u64,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            page_timeout_ms: 90_000,
            wait_timeout_ms: 45_000,
            window_width: 1920,
            window_height: 1080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub submissions_file: String,
    /// Saved browser cookies, relative to `directory`.
    pub session_state_file: String,
    pub screenshots: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            submissions_file: "submissions.jsonl".to_string(),
            session_state_file: "state.json".to_string(),
            screenshots: true,
        }
    }
}

impl OutputConfig {
    pub fn submissions_path(&self) -> PathBuf {
        self.directory.join(&self.submissions_file)
    }

    pub fn session_state_path(&self) -> PathBuf {
        self.directory.join(&self.session_state_file)
    }

    pub fn screenshot_dir(&self) -> Option<PathBuf> {
        self.screenshots.then(|| self.directory.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: Some(PathBuf::from("logs")),
            file_prefix: "snowdash.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "127.0.0.1:9001".to_string(),
        }
    }
}

impl AppConfig {
    /// Layered load: `config/default`, the explicit file, `config/local`, then
    /// `SNOWDASH_*` environment variables such as `SNOWDASH_AUTH__OTP_SECRET`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix("SNOWDASH")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn load_with_env(path: Option<&Path>, environment: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let s = builder
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            .add_source(environment)
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.auth.login_url).is_err() {
            return Err(ConfigError::Message("Invalid auth.login_url format".into()));
        }

        if Url::parse(&self.dashboard.base_url).is_err() {
            return Err(ConfigError::Message("Invalid dashboard.base_url format".into()));
        }

        for (key, url) in [
            ("store_webhook_url", &self.notifications.store_webhook_url),
            ("summary_webhook_url", &self.notifications.summary_webhook_url),
        ] {
            if let Some(url) = url {
                if Url::parse(url).is_err() {
                    return Err(ConfigError::Message(format!("Invalid notifications.{} format", key)));
                }
            }
        }

        // Validate retry configuration
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Message("Retry max_attempts must be greater than 0".into()));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Message("Retry base_delay_ms cannot exceed max_delay_ms".into()));
        }

        if self.retry.store_timeout_secs == 0 {
            return Err(ConfigError::Message("Retry store_timeout_secs must be greater than 0".into()));
        }

        if self.browser.page_timeout_ms == 0 || self.browser.wait_timeout_ms == 0 {
            return Err(ConfigError::Message("Browser timeouts must be greater than 0".into()));
        }

        if self.notifications.request_timeout_secs == 0 {
            return Err(ConfigError::Message("Notification request_timeout_secs must be greater than 0".into()));
        }

        let mut seen = HashSet::new();
        for store in &self.stores {
            if store.merchant_id.trim().is_empty() || store.marketplace_id.trim().is_empty() {
                return Err(ConfigError::Message(format!(
                    "Store '{}' must have a merchant_id and a marketplace_id",
                    store.name
                )));
            }
            if !seen.insert(store.key()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate store target: merchant {} in marketplace {}",
                    store.merchant_id, store.marketplace_id
                )));
            }
        }

        if let Some(schedule) = &self.schedule {
            if !is_valid_cron(schedule) {
                return Err(ConfigError::Message("Invalid cron expression in schedule".into()));
            }
        }

        Ok(())
    }
}

/// Basic shape check for the six- or seven-field expressions the job
/// scheduler understands (seconds first, optional year last).
pub fn is_valid_cron(cron_expr: &str) -> bool {
    let parts: Vec<&str> = cron_expr.split_whitespace().collect();
    if parts.len() != 6 && parts.len() != 7 {
        return false;
    }

    parts.iter().all(|part| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '-' | ',' | '/' | '?'))
    })
}
