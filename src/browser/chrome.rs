use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::{ClearBrowserCookies, Cookie, CookieParam};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{html, BrowserDriver, StoredCookie};
use crate::config::BrowserConfig;
use crate::utils::error::BrowserError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// `BrowserDriver` backed by a single headless Chrome tab.
pub struct ChromeDriver {
    // Keeps the Chrome process alive for as long as the tab is in use.
    _browser: Browser,
    tab: Arc<Tab>,
    wait_timeout: Duration,
}

fn is_timeout(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("timed out") || message.contains("timeout") || message.contains("never came")
}

fn navigation_error(e: impl std::fmt::Display) -> BrowserError {
    let message = e.to_string();
    if is_timeout(&message) {
        BrowserError::Timeout(message)
    } else {
        BrowserError::Navigation(message)
    }
}

fn element_error(selector: &str, e: impl std::fmt::Display) -> BrowserError {
    let message = e.to_string();
    if is_timeout(&message) {
        BrowserError::Timeout(format!("waiting for '{}': {}", selector, message))
    } else {
        BrowserError::ElementNotFound {
            selector: selector.to_string(),
        }
    }
}

impl ChromeDriver {
    /// Launch Chrome and open the working tab. Blocking.
    pub fn launch(config: &BrowserConfig) -> Result<Self, BrowserError> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false) // Often needed in containerized environments
            .window_size(Some((config.window_width, config.window_height)))
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
            ])
            .build()
            .map_err(|e| BrowserError::Protocol(format!("Failed to create launch options: {}", e)))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(PathBuf::from(chrome_path));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| BrowserError::Protocol(format!("Failed to launch browser: {}", e)))?;
        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::Protocol(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_millis(config.page_timeout_ms));

        info!(headless = config.headless, "Browser launched");

        Ok(Self {
            _browser: browser,
            tab,
            wait_timeout: Duration::from_millis(config.wait_timeout_ms),
        })
    }
}

/// Run a blocking tab call on the blocking pool so callers' timeouts can fire.
async fn blocking<T, F>(f: F) -> Result<T, BrowserError>
where
    F: FnOnce() -> Result<T, BrowserError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BrowserError::Protocol(format!("Browser task failed: {}", e)))?
}

fn page_html(tab: &Tab) -> Result<String, BrowserError> {
    tab.get_content()
        .map_err(|e| BrowserError::Protocol(format!("Failed to get page content: {}", e)))
}

fn fill_now(tab: &Tab, selector: &str, value: &str, wait_timeout: Duration) -> Result<(), BrowserError> {
    let element = tab
        .wait_for_element_with_custom_timeout(selector, wait_timeout)
        .map_err(|e| element_error(selector, e))?;
    element
        .click()
        .map_err(|e| BrowserError::Protocol(format!("Failed to focus '{}': {}", selector, e)))?;
    element
        .call_js_fn("function() { this.value = ''; }", vec![], false)
        .map_err(|e| BrowserError::Protocol(format!("Failed to clear '{}': {}", selector, e)))?;
    element
        .type_into(value)
        .map_err(|e| BrowserError::Protocol(format!("Failed to type into '{}': {}", selector, e)))?;
    Ok(())
}

fn click_now(tab: &Tab, selector: &str, wait_timeout: Duration) -> Result<(), BrowserError> {
    let element = tab
        .wait_for_element_with_custom_timeout(selector, wait_timeout)
        .map_err(|e| element_error(selector, e))?;
    element
        .click()
        .map_err(|e| BrowserError::Protocol(format!("Failed to click '{}': {}", selector, e)))?;
    // Form submissions navigate; let them settle before the next query.
    tab.wait_until_navigated().map_err(navigation_error)?;
    Ok(())
}

fn to_cookie_param(cookie: &StoredCookie) -> Result<CookieParam, BrowserError> {
    serde_json::to_value(cookie)
        .and_then(serde_json::from_value::<CookieParam>)
        .map_err(|e| BrowserError::Protocol(format!("Invalid cookie '{}': {}", cookie.name, e)))
}

fn from_cdp_cookie(cookie: &Cookie) -> Result<StoredCookie, BrowserError> {
    let mut stored = serde_json::to_value(cookie)
        .and_then(serde_json::from_value::<StoredCookie>)
        .map_err(|e| BrowserError::Protocol(format!("Unreadable cookie: {}", e)))?;
    // DevTools reports session cookies with a negative expiry.
    if stored.expires.is_some_and(|expires| expires < 0.0) {
        stored.expires = None;
    }
    Ok(stored)
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        debug!(url, "Navigating");
        let tab = Arc::clone(&self.tab);
        let url = url.to_string();
        blocking(move || {
            tab.navigate_to(&url).map_err(navigation_error)?;
            tab.wait_until_navigated().map_err(navigation_error)?;
            Ok(())
        })
        .await
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let tab = Arc::clone(&self.tab);
        blocking(move || Ok(tab.get_url())).await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let tab = Arc::clone(&self.tab);
        let (selector, value, wait) = (selector.to_string(), value.to_string(), self.wait_timeout);
        blocking(move || fill_now(&tab, &selector, &value, wait)).await
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let tab = Arc::clone(&self.tab);
        let (selector, wait) = (selector.to_string(), self.wait_timeout);
        blocking(move || click_now(&tab, &selector, wait)).await
    }

    async fn wait_for_any(&self, selectors: &[&str], timeout: Duration) -> Result<usize, BrowserError> {
        let deadline = Instant::now() + timeout;
        let owned: Vec<String> = selectors.iter().map(|s| s.to_string()).collect();
        loop {
            let tab = Arc::clone(&self.tab);
            let candidates = owned.clone();
            let found = blocking(move || {
                Ok(candidates
                    .iter()
                    .position(|selector| tab.find_element(selector).is_ok()))
            })
            .await?;
            if let Some(index) = found {
                return Ok(index);
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(format!(
                    "none of {:?} appeared within {}s",
                    selectors,
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn read_text(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        let tab = Arc::clone(&self.tab);
        let content = blocking(move || page_html(&tab)).await?;
        html::extract_text(&content, selector)
    }

    async fn read_table(&self, selector: &str) -> Result<Vec<Vec<String>>, BrowserError> {
        let tab = Arc::clone(&self.tab);
        let content = blocking(move || page_html(&tab)).await?;
        html::extract_table(&content, selector)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let tab = Arc::clone(&self.tab);
        blocking(move || {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(|e| BrowserError::Protocol(format!("Screenshot capture failed: {}", e)))
        })
        .await
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>, BrowserError> {
        let tab = Arc::clone(&self.tab);
        let cookies = blocking(move || {
            tab.get_cookies()
                .map_err(|e| BrowserError::Protocol(format!("Failed to read cookies: {}", e)))
        })
        .await?;
        cookies.iter().map(from_cdp_cookie).collect()
    }

    async fn restore_cookies(&self, cookies: &[StoredCookie]) -> Result<(), BrowserError> {
        let params = cookies.iter().map(to_cookie_param).collect::<Result<Vec<_>, _>>()?;
        let tab = Arc::clone(&self.tab);
        blocking(move || {
            tab.call_method(ClearBrowserCookies(None))
                .map_err(|e| BrowserError::Protocol(format!("Failed to clear cookies: {}", e)))?;
            tab.set_cookies(params)
                .map_err(|e| BrowserError::Protocol(format!("Failed to restore cookies: {}", e)))
        })
        .await
    }
}
