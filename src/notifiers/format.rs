use chrono::{DateTime, Local};
use std::fmt::Write;
use url::form_urlencoded;

use crate::config::NotificationsConfig;
use crate::models::{FleetSummary, MetricsRecord, StoreTarget};

const GOOD: &str = "✅";
const BAD: &str = "❌";
const TIMESTAMP_FORMAT: &str = "%A %d %B, %H:%M";
const QR_CODE_SIZE: u32 = 60;

/// Targets the store metrics are judged against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum acceptable units per hour.
    pub uph_target: f64,
    pub late_rate_max: f64,
    pub inf_rate_max: f64,
}

impl Thresholds {
    pub fn from_config(config: &NotificationsConfig) -> Self {
        Self {
            uph_target: config.uph_target,
            late_rate_max: config.late_rate_max,
            inf_rate_max: config.inf_rate_max,
        }
    }

    fn uph(&self, value: f64) -> String {
        badge(format!("{:.0}", value), value >= self.uph_target)
    }

    fn late(&self, value: f64) -> String {
        badge(format!("{:.1} %", value), value <= self.late_rate_max)
    }

    fn inf(&self, value: f64) -> String {
        badge(format!("{:.1} %", value), value <= self.inf_rate_max)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_config(&NotificationsConfig::default())
    }
}

fn badge(value: String, good: bool) -> String {
    format!("{} {}", value, if good { GOOD } else { BAD })
}

/// QR code image for a SKU.
fn qr_code_url(sku: &str) -> String {
    let data: String = form_urlencoded::byte_serialize(sku.as_bytes()).collect();
    format!(
        "https://api.qrserver.com/v1/create-qr-code/?size={size}x{size}&data={data}",
        size = QR_CODE_SIZE
    )
}

fn header(title: &str, now: DateTime<Local>) -> String {
    format!("*{}*\n{}\n", title, now.format(TIMESTAMP_FORMAT))
}

/// Per-store message for a successful collection.
pub fn format_store_report(record: &MetricsRecord, thresholds: &Thresholds, now: DateTime<Local>) -> String {
    let mut text = header(record.store.short_name(), now);
    let totals = &record.totals;

    text.push_str("\n*Store-Wide Performance*\n");
    if record.shoppers.is_empty() {
        text.push_str("No active shoppers found for this period.\n");
    } else {
        let _ = writeln!(text, "• UPH: {}", thresholds.uph(totals.uph()));
        let _ = writeln!(text, "• Lates: {}", thresholds.late(totals.late_rate()));
        let _ = writeln!(text, "• INF: {}", thresholds.inf(totals.inf_rate()));
        let _ = writeln!(text, "• Orders: {}", totals.orders);

        let _ = writeln!(text, "\n*Per-Shopper Breakdown ({})*", record.shoppers.len());
        for shopper in &record.shoppers {
            let _ = writeln!(
                text,
                "• {} ({} orders): UPH {} | INF {} | Lates {}",
                shopper.name,
                shopper.orders,
                thresholds.uph(shopper.uph),
                thresholds.inf(shopper.inf_rate),
                thresholds.late(shopper.late_rate),
            );
        }
    }

    if !record.inventory.is_empty() {
        let _ = writeln!(text, "\n*Top {} INF Items*", record.inventory.len());
        for item in &record.inventory {
            let _ = writeln!(text, "• {}", item.product_name);
            let _ = writeln!(
                text,
                "  SKU: {} | INF Units: {:.0} ({:.1} %) | Orders: {}",
                item.sku, item.inf_units, item.inf_rate, item.orders_impacted
            );
            if !item.sku.is_empty() {
                let _ = writeln!(text, "  QR: {}", qr_code_url(&item.sku));
            }
            if !item.image_url.is_empty() {
                let _ = writeln!(text, "  {}", item.image_url);
            }
        }
    }

    text.trim_end().to_string()
}

/// Per-store message when collection failed.
pub fn format_store_failure(store: &StoreTarget, reason: &str, attempts: u32, now: DateTime<Local>) -> String {
    let mut text = header(store.short_name(), now);
    let _ = writeln!(text, "\n{} Metrics could not be collected after {} attempt(s).", BAD, attempts);
    let _ = write!(text, "Reason: {}", reason);
    text
}

/// End-of-run fleet rollup.
pub fn format_fleet_summary(
    summary: &FleetSummary,
    title: &str,
    thresholds: &Thresholds,
    now: DateTime<Local>,
) -> String {
    let mut text = format!("*{}*\n{} | {} stores\n", title, now.format(TIMESTAMP_FORMAT), summary.total);
    let _ = writeln!(
        text,
        "\nStores processed: {} ({} succeeded, {} failed)",
        summary.total, summary.succeeded, summary.failed
    );

    if summary.succeeded > 0 {
        text.push_str("\n*Fleet-Wide Performance (Weighted Avg)*\n");
        let _ = writeln!(text, "• UPH: {}", thresholds.uph(summary.fleet_uph));
        let _ = writeln!(text, "• Lates: {}", thresholds.late(summary.fleet_late_rate));
        let _ = writeln!(text, "• INF: {}", thresholds.inf(summary.fleet_inf_rate));
        let _ = writeln!(text, "• Total Orders: {}", summary.total_orders);
    }

    if !summary.stores.is_empty() {
        text.push_str("\n*Per-Store Breakdown*\n");
        for store in &summary.stores {
            if store.success {
                let _ = writeln!(
                    text,
                    "• {} ({} orders): UPH {} | Lates {} | INF {}",
                    store.name,
                    store.orders,
                    thresholds.uph(store.uph),
                    thresholds.late(store.late_rate),
                    thresholds.inf(store.inf_rate),
                );
                if let Some(item) = &store.top_inf_item {
                    let _ = writeln!(text, "  _Top INF: {}_", item);
                }
            } else {
                let _ = writeln!(
                    text,
                    "• {} {}: failed after {} attempt(s): {}",
                    BAD,
                    store.name,
                    store.attempts,
                    store.reason.as_deref().unwrap_or("unknown"),
                );
            }
        }
    }

    let failed: Vec<&str> = summary.failed_stores().map(|s| s.name.as_str()).collect();
    if !failed.is_empty() {
        let _ = writeln!(text, "\n*Failed stores:* {}", failed.join(", "));
    }

    text.trim_end().to_string()
}

/// Sent instead of any store message when the run cannot start.
pub fn format_run_failure(title: &str, reason: &str, now: DateTime<Local>) -> String {
    let mut text = header(title, now);
    let _ = writeln!(text, "\n{} Run aborted before any store was processed.", BAD);
    let _ = write!(text, "Reason: {}", reason);
    text
}
