use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::browser::{capture_screenshot, BrowserDriver};
use crate::config::{AppConfig, AuthConfig, LoginSelectors};
use crate::scraper::dashboard_url;
use crate::utils::error::{AppError, AuthError, BrowserError};
use crate::utils::metrics::record_session_acquisition;

pub mod otp;
pub mod state;

pub use otp::{OtpCandidate, OtpGenerator};
pub use state::SavedSession;

/// Login credentials. Opaque to the controller apart from non-emptiness.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub otp_secret: String,
}

impl Credentials {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            email: config.email.clone(),
            password: config.password.clone(),
            otp_secret: config.otp_secret.clone(),
        }
    }

    fn ensure_present(&self) -> Result<(), AuthError> {
        if self.email.trim().is_empty() {
            return Err(AuthError::InvalidCredentials("login e-mail is empty".to_string()));
        }
        if self.password.is_empty() {
            return Err(AuthError::InvalidCredentials("password is empty".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// An authenticated browser context.
#[derive(Clone)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    max_age: Option<chrono::Duration>,
    driver: Arc<dyn BrowserDriver>,
}

impl Session {
    pub fn new(driver: Arc<dyn BrowserDriver>, created_at: DateTime<Utc>, max_age: Option<chrono::Duration>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at,
            max_age,
            driver,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match self.max_age {
            Some(max_age) => now - self.created_at < max_age,
            None => true,
        }
    }

    pub fn browser(&self) -> &dyn BrowserDriver {
        self.driver.as_ref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum SessionState {
    Unauthenticated,
    OtpPending { challenged_at: DateTime<Utc> },
    Authenticated(Session),
    Expired { since: DateTime<Utc> },
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::OtpPending { .. } => "otp_pending",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Expired { .. } => "expired",
        }
    }
}

/// A URL on the sign-in flow means the site no longer honours the session.
pub fn is_sign_in_url(url: &str) -> bool {
    let url = url.to_lowercase();
    url.contains("signin") || url.contains("/ap/")
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub login_url: String,
    pub selectors: LoginSelectors,
    pub wait_timeout: Duration,
    pub max_age: Option<chrono::Duration>,
    pub screenshot_dir: Option<PathBuf>,
    /// Visited after login to confirm the session sticks.
    pub verify_url: Option<String>,
    /// Where cookies of the last login are kept. `None` disables reuse.
    pub state_path: Option<PathBuf>,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let verify_url = config
            .stores
            .first()
            .and_then(|store| dashboard_url(&config.dashboard, store).ok())
            .map(|url| url.to_string());

        Self {
            login_url: config.auth.login_url.clone(),
            selectors: config.auth.selectors.clone(),
            wait_timeout: Duration::from_millis(config.browser.wait_timeout_ms),
            max_age: config
                .auth
                .session_max_age_mins
                .map(|mins| chrono::Duration::minutes(mins as i64)),
            screenshot_dir: config.output.screenshot_dir(),
            verify_url,
            state_path: config
                .auth
                .reuse_saved_session
                .then(|| config.output.session_state_path()),
        }
    }
}

enum LoginPage {
    OtpChallenge,
    CredentialError,
    Landed,
}

/// Owns the browser login and the single active session of a run.
pub struct SessionController {
    driver: Arc<dyn BrowserDriver>,
    credentials: Credentials,
    settings: SessionSettings,
    state: SessionState,
    acquisitions: u32,
    restore_attempted: bool,
    clock: fn() -> DateTime<Utc>,
}

impl SessionController {
    pub fn new(driver: Arc<dyn BrowserDriver>, credentials: Credentials, settings: SessionSettings) -> Self {
        Self {
            driver,
            credentials,
            settings,
            state: SessionState::Unauthenticated,
            acquisitions: 0,
            restore_attempted: false,
            clock: Utc::now,
        }
    }

    /// Replace the wall clock used for OTP windows and session age.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Number of login flows started.
    pub fn acquisitions(&self) -> u32 {
        self.acquisitions
    }

    /// The active session, if it is still valid.
    pub fn current(&self) -> Option<&Session> {
        match &self.state {
            SessionState::Authenticated(session) if session.is_valid((self.clock)()) => Some(session),
            _ => None,
        }
    }

    /// Return the valid session. The first call tries the saved session;
    /// without a usable session a fresh login is made.
    pub async fn acquire(&mut self) -> Result<&Session, AuthError> {
        if self.current().is_none() {
            if matches!(self.state, SessionState::Authenticated(_)) {
                self.invalidate();
            }
            if !self.restore_attempted {
                self.restore_attempted = true;
                self.restore_saved().await;
            }
            if self.current().is_none() {
                self.login().await?;
            }
        }

        self.current()
            .ok_or_else(|| AuthError::SiteUnavailable("session not available after login".to_string()))
    }

    /// Mark the current session unusable.
    pub fn invalidate(&mut self) {
        if let SessionState::Authenticated(session) = &self.state {
            warn!(session_id = %session.id(), "Session invalidated");
            let since = (self.clock)();
            self.transition(SessionState::Expired { since });
        }
    }

    /// Invalidate and log in again.
    pub async fn reacquire(&mut self) -> Result<&Session, AuthError> {
        self.invalidate();
        self.acquire().await
    }

    pub async fn close(&mut self) {
        if !matches!(self.state, SessionState::Unauthenticated) {
            info!("Closing session");
        }
        self.transition(SessionState::Unauthenticated);
    }

    fn transition(&mut self, next: SessionState) {
        if self.state.label() != next.label() {
            debug!(from = self.state.label(), to = next.label(), "Session state change");
        }
        self.state = next;
    }

    async fn login(&mut self) -> Result<(), AuthError> {
        self.credentials.ensure_present()?;
        self.acquisitions += 1;
        info!(attempt = self.acquisitions, "Starting login flow");

        match self.login_flow().await {
            Ok(session) => {
                info!(session_id = %session.id(), "Login successful");
                record_session_acquisition(true);
                self.transition(SessionState::Authenticated(session));
                self.save_session().await;
                Ok(())
            }
            Err(e) => {
                error!(reason = %e, "Login failed");
                record_session_acquisition(false);
                if let Some(dir) = &self.settings.screenshot_dir {
                    capture_screenshot(self.driver.as_ref(), dir, "login_failure").await;
                }
                self.transition(SessionState::Unauthenticated);
                Err(e)
            }
        }
    }

    /// Adopt the saved session when the site still honours its cookies.
    async fn restore_saved(&mut self) {
        let (Some(path), Some(verify_url)) = (self.settings.state_path.clone(), self.settings.verify_url.clone())
        else {
            return;
        };

        let saved = match SavedSession::load(&path).await {
            Ok(Some(saved)) => saved,
            Ok(None) => return,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable saved session");
                return;
            }
        };

        match self.verify_cookies(&saved, &verify_url).await {
            Ok(true) => {
                let session = Session::new(Arc::clone(&self.driver), saved.saved_at, self.settings.max_age);
                info!(session_id = %session.id(), saved_at = %saved.saved_at, "Reusing saved session");
                self.transition(SessionState::Authenticated(session));
                if self.current().is_none() {
                    info!("Saved session is past its maximum age");
                    self.invalidate();
                }
            }
            Ok(false) => info!("Saved session no longer accepted, logging in"),
            Err(e) => warn!(error = %e, "Could not restore saved session"),
        }
    }

    async fn verify_cookies(&self, saved: &SavedSession, verify_url: &str) -> Result<bool, BrowserError> {
        self.driver.restore_cookies(&saved.cookies).await?;
        self.driver.navigate(verify_url).await?;
        let landed_on = self.driver.current_url().await?;
        Ok(!is_sign_in_url(&landed_on))
    }

    async fn save_session(&self) {
        let Some(path) = &self.settings.state_path else {
            return;
        };

        let result: Result<(), AppError> = async {
            let cookies = self.driver.cookies().await?;
            SavedSession::new(cookies, (self.clock)()).save(path).await
        }
        .await;

        match result {
            Ok(()) => debug!(path = %path.display(), "Session saved"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to save session"),
        }
    }

    async fn login_flow(&mut self) -> Result<Session, AuthError> {
        let driver = Arc::clone(&self.driver);
        let selectors = self.settings.selectors.clone();
        let credentials = self.credentials.clone();
        let wait = self.settings.wait_timeout;

        self.transition(SessionState::Unauthenticated);
        driver.navigate(&self.settings.login_url).await?;

        let entry = driver
            .wait_for_any(
                &[selectors.email_field.as_str(), selectors.interstitial_continue.as_str()],
                wait,
            )
            .await?;
        if entry == 1 {
            info!("Interstitial page detected, continuing to sign-in");
            driver.click(&selectors.interstitial_continue).await?;
            driver.wait_for_any(&[selectors.email_field.as_str()], wait).await?;
        }

        driver.fill(&selectors.email_field, &credentials.email).await?;
        driver.click(&selectors.email_continue).await?;
        driver.wait_for_any(&[selectors.password_field.as_str()], wait).await?;
        driver.fill(&selectors.password_field, &credentials.password).await?;
        driver.click(&selectors.sign_in_button).await?;

        match self.classify_page(driver.as_ref(), &selectors).await? {
            LoginPage::Landed => {}
            LoginPage::CredentialError => {
                return Err(AuthError::InvalidCredentials(
                    "the site rejected the e-mail or password".to_string(),
                ));
            }
            LoginPage::OtpChallenge => self.submit_otp(driver.as_ref(), &selectors, &credentials).await?,
        }

        if let Some(verify_url) = self.settings.verify_url.clone() {
            driver.navigate(&verify_url).await?;
            let landed_on = driver.current_url().await?;
            if is_sign_in_url(&landed_on) {
                return Err(AuthError::InvalidCredentials(
                    "redirected to sign-in after login".to_string(),
                ));
            }
        }

        Ok(Session::new(driver, (self.clock)(), self.settings.max_age))
    }

    async fn submit_otp(
        &mut self,
        driver: &dyn BrowserDriver,
        selectors: &LoginSelectors,
        credentials: &Credentials,
    ) -> Result<(), AuthError> {
        let challenged_at = (self.clock)();
        self.transition(SessionState::OtpPending { challenged_at });
        info!("One-time code requested");

        let generator = OtpGenerator::new(&credentials.otp_secret)?;
        let candidates = generator.candidate_codes(challenged_at);

        for candidate in &candidates {
            debug!(window_offset = candidate.window_offset, "Submitting one-time code");
            driver.fill(&selectors.otp_field, &candidate.code).await?;
            driver.click(&selectors.otp_submit).await?;

            match self.classify_page(driver, selectors).await? {
                LoginPage::Landed => {
                    if candidate.window_offset != 0 {
                        info!(window_offset = candidate.window_offset, "One-time code accepted from adjacent window");
                    }
                    return Ok(());
                }
                LoginPage::OtpChallenge => {
                    warn!(window_offset = candidate.window_offset, "One-time code rejected");
                }
                LoginPage::CredentialError => break,
            }
        }

        Err(AuthError::OtpRejected {
            windows: candidates.len(),
        })
    }

    async fn classify_page(
        &self,
        driver: &dyn BrowserDriver,
        selectors: &LoginSelectors,
    ) -> Result<LoginPage, AuthError> {
        let mut candidates = vec![selectors.otp_field.as_str(), selectors.auth_error.as_str()];
        candidates.extend(selectors.landing_markers.iter().map(String::as_str));

        match driver.wait_for_any(&candidates, self.settings.wait_timeout).await {
            Ok(0) => Ok(LoginPage::OtpChallenge),
            Ok(1) => Ok(LoginPage::CredentialError),
            Ok(_) => Ok(LoginPage::Landed),
            Err(BrowserError::Timeout(_)) => Err(AuthError::Timeout(
                "no login outcome appeared after submitting the form".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }
}
