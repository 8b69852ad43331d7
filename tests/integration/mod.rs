// Integration tests for Snowdash Reporter
// A scripted fake site stands in for the browser; wiremock stands in for chat.

pub mod pipeline_tests;
pub mod session_tests;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use snowdash_reporter::browser::{BrowserDriver, StoredCookie};
use snowdash_reporter::config::{AppConfig, AuthConfig, DashboardSelectors, LoginSelectors, NotificationsConfig};
use snowdash_reporter::models::StoreTarget;
use snowdash_reporter::notifiers::WebhookNotifier;
use snowdash_reporter::submission_log::SubmissionLog;
use snowdash_reporter::utils::error::BrowserError;
use snowdash_reporter::RunContext;

pub const BASE_URL: &str = "https://dashboard.test";
pub const LOGIN_URL: &str = "https://dashboard.test/ap/signin";
pub const SIGN_IN_REDIRECT: &str = "https://dashboard.test/ap/signin?reason=expired";
pub const EMAIL: &str = "manager@example.com";
pub const PASSWORD: &str = "correct horse";
pub const OTP_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";
pub const SESSION_COOKIE: &str = "session-token";

/// Scripted misbehaviour for one store's dashboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fault {
    /// Reading the shopper table times out.
    Timeout,
    /// The site drops the session when the dashboard loads.
    Expire,
    /// The shopper table comes back in an unknown shape.
    Layout,
    /// Reading the shopper table never finishes.
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
enum Page {
    Blank,
    Email,
    Password,
    Otp,
    CredentialError,
    Landing,
    Dashboard(String),
    Inventory,
    SignIn,
}

#[derive(Debug)]
struct SiteState {
    page: Page,
    url: String,
    logged_in: bool,
    /// Cookie value the site currently honours.
    valid_token: Option<String>,
    entered_password: String,
    entered_code: String,
    faults: HashMap<String, VecDeque<Fault>>,
    login_starts: u32,
    logins: u32,
    otp_submissions: u32,
    dashboard_visits: u32,
    scrape_attempts: HashMap<String, u32>,
}

/// A `BrowserDriver` that plays the seller dashboard from a script.
#[derive(Debug)]
pub struct FakeSite {
    login: LoginSelectors,
    dashboard: DashboardSelectors,
    password: String,
    /// `Some` puts a one-time code challenge after the password step.
    accepted_codes: Option<Vec<String>>,
    /// Logins beyond this count are rejected as bad credentials.
    max_logins: Option<u32>,
    shopper_rows: Vec<Vec<String>>,
    inventory_rows: Vec<Vec<String>>,
    state: Mutex<SiteState>,
}

pub fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

pub fn default_shopper_rows() -> Vec<Vec<String>> {
    vec![
        row(&["Alice", "12", "240", "7200", "250", "4.0%", "0%"]),
        row(&["Bob", "8", "200", "3600", "200", "1.0%", "12.5%"]),
        row(&["SHOPPER_NAME_NOT_FOUND", "3", "30", "600", "30", "0%", "0%"]),
    ]
}

pub fn default_inventory_rows() -> Vec<Vec<String>> {
    vec![
        row(&[
            "https://m.media-amazon.com/images/I/milk._SS40_.jpg",
            "SKU-MILK",
            "Semi Skimmed Milk 2L",
            "6",
            "4",
            "",
            "",
            "",
            "8.0%",
        ]),
        row(&[
            "https://m.media-amazon.com/images/I/eggs._SS40_.jpg",
            "SKU-EGGS",
            "Free Range Eggs x12",
            "2",
            "2",
            "",
            "",
            "",
            "3.5%",
        ]),
    ]
}

impl FakeSite {
    pub fn new() -> Self {
        Self {
            login: LoginSelectors::default(),
            dashboard: DashboardSelectors::default(),
            password: PASSWORD.to_string(),
            accepted_codes: None,
            max_logins: None,
            shopper_rows: default_shopper_rows(),
            inventory_rows: default_inventory_rows(),
            state: Mutex::new(SiteState {
                page: Page::Blank,
                url: "about:blank".to_string(),
                logged_in: false,
                valid_token: None,
                entered_password: String::new(),
                entered_code: String::new(),
                faults: HashMap::new(),
                login_starts: 0,
                logins: 0,
                otp_submissions: 0,
                dashboard_visits: 0,
                scrape_attempts: HashMap::new(),
            }),
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn with_otp(mut self, accepted_codes: Vec<String>) -> Self {
        self.accepted_codes = Some(accepted_codes);
        self
    }

    pub fn with_max_logins(mut self, max_logins: u32) -> Self {
        self.max_logins = Some(max_logins);
        self
    }

    pub fn with_inventory_rows(mut self, rows: Vec<Vec<String>>) -> Self {
        self.inventory_rows = rows;
        self
    }

    pub fn with_faults(self, merchant_id: &str, faults: &[Fault]) -> Self {
        self.lock()
            .faults
            .insert(merchant_id.to_string(), faults.iter().copied().collect());
        self
    }

    fn lock(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap()
    }

    /// Login flows started.
    pub fn login_starts(&self) -> u32 {
        self.lock().login_starts
    }

    /// Login flows that reached the landing page.
    pub fn logins(&self) -> u32 {
        self.lock().logins
    }

    pub fn otp_submissions(&self) -> u32 {
        self.lock().otp_submissions
    }

    /// Navigations to any store dashboard, including post-login checks.
    pub fn dashboard_visits(&self) -> u32 {
        self.lock().dashboard_visits
    }

    /// Times the scraper waited on a store's dashboard.
    pub fn scrape_attempts(&self, merchant_id: &str) -> u32 {
        self.lock().scrape_attempts.get(merchant_id).copied().unwrap_or(0)
    }

    fn has_element(&self, state: &SiteState, selector: &str) -> bool {
        let login = &self.login;
        let dashboard = &self.dashboard;
        match &state.page {
            Page::Blank => false,
            Page::Email | Page::SignIn => selector == login.email_field,
            Page::Password => selector == login.password_field,
            Page::Otp => selector == login.otp_field,
            Page::CredentialError => selector == login.auth_error,
            Page::Landing => login.landing_markers.first().is_some_and(|marker| marker == selector),
            Page::Dashboard(_) => {
                selector == dashboard.dashboard_marker
                    || selector == dashboard.date_start_input
                    || selector == dashboard.metrics_table
            }
            Page::Inventory => {
                selector == dashboard.inventory_marker
                    || (selector == dashboard.inventory_row && !self.inventory_rows.is_empty())
            }
        }
    }

    /// Drop every session server-side, as an overnight expiry would.
    pub fn expire_sessions(&self) {
        Self::sign_out(&mut self.lock());
    }

    fn sign_in(state: &mut SiteState) {
        state.logins += 1;
        state.logged_in = true;
        state.valid_token = Some(format!("token-{}", state.logins));
        state.page = Page::Landing;
    }

    fn sign_out(state: &mut SiteState) {
        state.logged_in = false;
        state.valid_token = None;
        state.page = Page::SignIn;
        state.url = SIGN_IN_REDIRECT.to_string();
    }
}

#[async_trait]
impl BrowserDriver for FakeSite {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let mut state = self.lock();
        let parsed = Url::parse(url).map_err(|e| BrowserError::Navigation(e.to_string()))?;

        if url.starts_with(LOGIN_URL) {
            state.login_starts += 1;
            state.page = Page::Email;
            state.url = url.to_string();
            return Ok(());
        }

        let is_dashboard = parsed.path().starts_with("/snowdash");
        let is_inventory = parsed.path().starts_with("/snow-inventory");
        if !is_dashboard && !is_inventory {
            return Err(BrowserError::Navigation(format!("unknown page {}", url)));
        }
        if is_dashboard {
            state.dashboard_visits += 1;
        }
        if !state.logged_in {
            Self::sign_out(&mut state);
            return Ok(());
        }

        state.url = url.to_string();
        state.page = if is_dashboard {
            let merchant = parsed
                .query_pairs()
                .find(|(key, _)| key == "mons_sel_dir_mcid")
                .map(|(_, value)| value.into_owned())
                .unwrap_or_default();
            Page::Dashboard(merchant)
        } else {
            Page::Inventory
        };
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.lock().url.clone())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let mut state = self.lock();
        let known = match &state.page {
            Page::Email | Page::SignIn => selector == self.login.email_field,
            Page::Password => selector == self.login.password_field,
            Page::Otp => selector == self.login.otp_field,
            Page::Dashboard(_) => {
                selector == self.dashboard.date_start_input || selector == self.dashboard.date_end_input
            }
            _ => false,
        };
        if !known {
            return Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            });
        }

        if state.page == Page::Password {
            state.entered_password = value.to_string();
        } else if state.page == Page::Otp {
            state.entered_code = value.to_string();
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let mut state = self.lock();
        let page = state.page.clone();

        match page {
            Page::Email if selector == self.login.email_continue => {
                state.page = Page::Password;
            }
            Page::Password if selector == self.login.sign_in_button => {
                let over_limit = self.max_logins.is_some_and(|max| state.logins >= max);
                if state.entered_password != self.password || over_limit {
                    state.page = Page::CredentialError;
                } else if self.accepted_codes.is_some() {
                    state.page = Page::Otp;
                } else {
                    Self::sign_in(&mut state);
                }
            }
            Page::Otp if selector == self.login.otp_submit => {
                state.otp_submissions += 1;
                let accepted = self
                    .accepted_codes
                    .as_ref()
                    .is_some_and(|codes| codes.contains(&state.entered_code));
                if accepted {
                    Self::sign_in(&mut state);
                }
            }
            Page::Dashboard(_)
                if selector == self.dashboard.customise_button || selector == self.dashboard.apply_button => {}
            Page::Inventory if selector == self.dashboard.inventory_sort => {}
            _ => {
                return Err(BrowserError::ElementNotFound {
                    selector: selector.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn wait_for_any(&self, selectors: &[&str], _timeout: Duration) -> Result<usize, BrowserError> {
        let mut state = self.lock();

        if let Page::Dashboard(merchant) = state.page.clone() {
            if selectors.contains(&self.dashboard.dashboard_marker.as_str()) {
                *state.scrape_attempts.entry(merchant.clone()).or_insert(0) += 1;
                let expire = state.faults.get(&merchant).and_then(|faults| faults.front()) == Some(&Fault::Expire);
                if expire {
                    if let Some(faults) = state.faults.get_mut(&merchant) {
                        faults.pop_front();
                    }
                    Self::sign_out(&mut state);
                    return Err(BrowserError::Timeout("dashboard marker".to_string()));
                }
            }
        }

        selectors
            .iter()
            .position(|selector| self.has_element(&state, selector))
            .ok_or_else(|| BrowserError::Timeout(format!("none of {:?} appeared", selectors)))
    }

    async fn read_text(&self, _selector: &str) -> Result<Option<String>, BrowserError> {
        Ok(None)
    }

    async fn read_table(&self, selector: &str) -> Result<Vec<Vec<String>>, BrowserError> {
        let fault = {
            let mut state = self.lock();
            match state.page.clone() {
                Page::Dashboard(merchant) if selector == self.dashboard.metrics_table => {
                    state.faults.get_mut(&merchant).and_then(|faults| faults.pop_front())
                }
                Page::Inventory if selector == self.dashboard.inventory_table => {
                    return Ok(self.inventory_rows.clone());
                }
                _ => return Ok(Vec::new()),
            }
        };

        match fault {
            None | Some(Fault::Expire) => Ok(self.shopper_rows.clone()),
            Some(Fault::Timeout) => Err(BrowserError::Timeout("shopper table".to_string())),
            Some(Fault::Layout) => Ok(vec![row(&["Total", "20"]), row(&["Alice", "12", "240"])]),
            Some(Fault::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        Ok(Vec::new())
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>, BrowserError> {
        let state = self.lock();
        let cookies = match (&state.valid_token, state.logged_in) {
            (Some(token), true) => vec![StoredCookie {
                name: SESSION_COOKIE.to_string(),
                value: token.clone(),
                domain: "dashboard.test".to_string(),
                path: "/".to_string(),
                expires: None,
                secure: true,
                http_only: true,
            }],
            _ => Vec::new(),
        };
        Ok(cookies)
    }

    async fn restore_cookies(&self, cookies: &[StoredCookie]) -> Result<(), BrowserError> {
        let mut state = self.lock();
        let honoured = state.valid_token.clone();
        state.logged_in = cookies
            .iter()
            .any(|cookie| cookie.name == SESSION_COOKIE && Some(&cookie.value) == honoured.as_ref());
        Ok(())
    }
}

pub fn stores(count: usize) -> Vec<StoreTarget> {
    (1..=count)
        .map(|i| StoreTarget::new(format!("A{}", i), "MK1", format!("Amazon Fresh - Store {}", i)))
        .collect()
}

/// Test configuration: no back-off, no post delay, no screenshots.
pub fn get_test_config(stores: Vec<StoreTarget>, webhook_base: &str, output: &TempDir) -> AppConfig {
    let mut config = AppConfig {
        auth: AuthConfig {
            login_url: LOGIN_URL.to_string(),
            email: EMAIL.to_string(),
            password: PASSWORD.to_string(),
            otp_secret: OTP_SECRET.to_string(),
            ..AuthConfig::default()
        },
        stores,
        notifications: NotificationsConfig {
            store_webhook_url: Some(format!("{}/store", webhook_base)),
            summary_webhook_url: Some(format!("{}/summary", webhook_base)),
            post_delay_ms: 0,
            request_timeout_secs: 5,
            ..NotificationsConfig::default()
        },
        ..AppConfig::default()
    };
    config.dashboard.base_url = BASE_URL.to_string();
    config.retry.base_delay_ms = 0;
    config.retry.max_delay_ms = 0;
    config.output.directory = output.path().to_path_buf();
    config.output.screenshots = false;
    config.logging.directory = None;
    config
}

/// Chat endpoint accepting both channels.
pub async fn start_chat_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/store"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/summary"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

/// Bodies posted to `channel` (`/store` or `/summary`), in order.
pub async fn posted_texts(server: &MockServer, channel: &str) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == channel)
        .filter_map(|request| serde_json::from_slice::<serde_json::Value>(&request.body).ok())
        .filter_map(|body| body["text"].as_str().map(str::to_string))
        .collect()
}

pub fn create_context(config: AppConfig, site: &Arc<FakeSite>) -> anyhow::Result<RunContext> {
    let sink = WebhookNotifier::new(&config.notifications)?;
    let log = SubmissionLog::open(config.output.submissions_path())?;
    let driver: Arc<dyn BrowserDriver> = site.clone();

    Ok(RunContext {
        config,
        driver,
        sink: Arc::new(sink),
        log: Arc::new(log),
    })
}
