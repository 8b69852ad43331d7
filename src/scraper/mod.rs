use chrono::{Local, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{capture_screenshot, BrowserDriver};
use crate::config::{AppConfig, DashboardConfig};
use crate::models::{InventoryItem, MetricsRecord, ShopperMetrics, StoreTarget};
use crate::session::{is_sign_in_url, Session};
use crate::utils::error::{BrowserError, ScrapeError};

pub mod inventory;
pub mod metrics;

use self::inventory::parse_inventory_rows;
use self::metrics::parse_shopper_rows;

/// Per-store dashboard URL: `{base}{metrics_path}?mons_sel_dir_mcid=..&mons_sel_mkid=..`.
pub fn dashboard_url(dashboard: &DashboardConfig, store: &StoreTarget) -> Result<Url, ScrapeError> {
    let mut url = Url::parse(&dashboard.base_url)
        .and_then(|base| base.join(&dashboard.metrics_path))
        .map_err(|e| ScrapeError::UnexpectedLayout(format!("invalid dashboard URL: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("mons_sel_dir_mcid", &store.merchant_id)
        .append_pair("mons_sel_mkid", &store.marketplace_id);
    Ok(url)
}

fn inventory_url(dashboard: &DashboardConfig) -> Result<Url, ScrapeError> {
    Url::parse(&dashboard.base_url)
        .and_then(|base| base.join(&dashboard.inventory_path))
        .map_err(|e| ScrapeError::UnexpectedLayout(format!("invalid inventory URL: {}", e)))
}

/// Collects one store's metrics through an authenticated session.
pub struct StoreScraper {
    dashboard: DashboardConfig,
    wait_timeout: Duration,
    screenshot_dir: Option<PathBuf>,
}

impl StoreScraper {
    pub fn new(dashboard: DashboardConfig, wait_timeout: Duration, screenshot_dir: Option<PathBuf>) -> Self {
        Self {
            dashboard,
            wait_timeout,
            screenshot_dir,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.dashboard.clone(),
            Duration::from_millis(config.browser.wait_timeout_ms),
            config.output.screenshot_dir(),
        )
    }

    /// Collect performance metrics and top INF items for `store`.
    ///
    /// The session is only read. A redirect to sign-in in either section is
    /// reported as `SessionExpired`; an inventory section that cannot be read
    /// degrades to an empty list.
    pub async fn scrape(&self, session: &Session, store: &StoreTarget) -> Result<MetricsRecord, ScrapeError> {
        if !session.is_valid(Utc::now()) {
            return Err(ScrapeError::SessionExpired);
        }
        let driver = session.browser();

        let shoppers = match self.collect_shoppers(driver, store).await {
            Ok(shoppers) => shoppers,
            Err(ScrapeError::SessionExpired) => return Err(ScrapeError::SessionExpired),
            Err(e) => {
                self.capture(driver, &format!("{}_metrics_error", store.name)).await;
                return Err(e);
            }
        };

        let inventory = match self.collect_inventory(driver, store).await {
            Ok(items) => items,
            Err(ScrapeError::SessionExpired) => return Err(ScrapeError::SessionExpired),
            Err(e) => {
                warn!(store = %store.name, reason = %e, "Inventory section unavailable, continuing without it");
                self.capture(driver, &format!("{}_inf_error", store.name)).await;
                Vec::new()
            }
        };

        info!(
            store = %store.name,
            shoppers = shoppers.len(),
            inf_items = inventory.len(),
            "Store metrics collected"
        );
        Ok(MetricsRecord::new(store.clone(), shoppers, inventory))
    }

    async fn ensure_authenticated(&self, driver: &dyn BrowserDriver) -> Result<(), ScrapeError> {
        let url = driver.current_url().await?;
        if is_sign_in_url(&url) {
            warn!(url = %url, "Redirected to sign-in");
            return Err(ScrapeError::SessionExpired);
        }
        Ok(())
    }

    async fn collect_shoppers(
        &self,
        driver: &dyn BrowserDriver,
        store: &StoreTarget,
    ) -> Result<Vec<ShopperMetrics>, ScrapeError> {
        let selectors = &self.dashboard.selectors;
        let url = dashboard_url(&self.dashboard, store)?;
        info!(store = %store.name, "Starting metrics collection");

        driver.navigate(url.as_str()).await?;
        self.ensure_authenticated(driver).await?;

        match driver
            .wait_for_any(&[selectors.dashboard_marker.as_str()], self.wait_timeout)
            .await
        {
            Ok(_) => {}
            Err(BrowserError::Timeout(_)) => {
                self.ensure_authenticated(driver).await?;
                return Err(ScrapeError::UnexpectedLayout(format!(
                    "dashboard marker '{}' not found",
                    selectors.dashboard_marker
                )));
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.apply_today_range(driver).await {
            warn!(store = %store.name, reason = %e, "Could not select today's date range, reading the default range");
        }
        self.ensure_authenticated(driver).await?;

        if let Err(e) = driver
            .wait_for_any(&[selectors.metrics_table.as_str()], self.wait_timeout)
            .await
        {
            debug!(store = %store.name, reason = %e, "Shopper table did not appear");
        }

        let rows = driver.read_table(&selectors.metrics_table).await?;
        let parsed = parse_shopper_rows(&rows, &self.dashboard.metrics_columns);
        if parsed.layout_changed(rows.len()) {
            return Err(ScrapeError::UnexpectedLayout(format!(
                "none of {} shopper rows matched the expected columns",
                rows.len()
            )));
        }
        if parsed.malformed > 0 {
            warn!(store = %store.name, malformed = parsed.malformed, "Skipped malformed shopper rows");
        }
        if parsed.items.is_empty() {
            warn!(store = %store.name, "No active shoppers found");
        }

        Ok(parsed.items)
    }

    async fn apply_today_range(&self, driver: &dyn BrowserDriver) -> Result<(), BrowserError> {
        let selectors = &self.dashboard.selectors;
        let today = Local::now().format("%m/%d/%Y").to_string();

        driver.click(&selectors.customise_button).await?;
        driver
            .wait_for_any(&[selectors.date_start_input.as_str()], self.wait_timeout)
            .await?;
        driver.fill(&selectors.date_start_input, &today).await?;
        driver.fill(&selectors.date_end_input, &today).await?;
        driver.click(&selectors.apply_button).await?;
        debug!(date = %today, "Date range applied");
        Ok(())
    }

    async fn collect_inventory(
        &self,
        driver: &dyn BrowserDriver,
        store: &StoreTarget,
    ) -> Result<Vec<InventoryItem>, ScrapeError> {
        let selectors = &self.dashboard.selectors;
        let url = inventory_url(&self.dashboard)?;
        info!(store = %store.name, "Starting INF collection");

        driver.navigate(url.as_str()).await?;
        self.ensure_authenticated(driver).await?;

        match driver
            .wait_for_any(&[selectors.inventory_marker.as_str()], self.wait_timeout)
            .await
        {
            Ok(_) => {}
            Err(BrowserError::Timeout(_)) => {
                self.ensure_authenticated(driver).await?;
                return Err(ScrapeError::UnexpectedLayout(format!(
                    "inventory marker '{}' not found",
                    selectors.inventory_marker
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let row_wait = self.wait_timeout / 2;
        if driver
            .wait_for_any(&[selectors.inventory_row.as_str()], row_wait)
            .await
            .is_err()
        {
            info!(store = %store.name, "No INF rows found");
            return Ok(Vec::new());
        }

        // Server-side sort brings the worst items onto the first page.
        if let Err(e) = driver.click(&selectors.inventory_sort).await {
            debug!(reason = %e, "INF table sort unavailable, sorting locally");
        }

        let rows = driver.read_table(&selectors.inventory_table).await?;
        let parsed = parse_inventory_rows(
            &rows,
            &self.dashboard.inventory_columns,
            self.dashboard.inventory_limit,
            self.dashboard.thumbnail_size,
        );
        if parsed.layout_changed(rows.len()) {
            return Err(ScrapeError::UnexpectedLayout(format!(
                "none of {} INF rows matched the expected columns",
                rows.len()
            )));
        }

        info!(store = %store.name, items = parsed.items.len(), "Collected top INF items");
        Ok(parsed.items)
    }

    async fn capture(&self, driver: &dyn BrowserDriver, prefix: &str) {
        if let Some(dir) = &self.screenshot_dir {
            capture_screenshot(driver, dir, prefix).await;
        }
    }
}
