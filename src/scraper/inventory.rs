use regex::Regex;
use std::sync::LazyLock;

use super::metrics::{parse_number, ParsedRows};
use crate::config::InventoryColumns;
use crate::models::InventoryItem;

static THUMBNAIL_SIZE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\._SS\d+_\.").expect("valid regex"));

/// Ask the image CDN for a `size`-pixel thumbnail instead of the tiny default.
pub fn resize_thumbnail(url: &str, size: u32) -> String {
    THUMBNAIL_SIZE
        .replace(url, format!("._SS{}_.", size).as_str())
        .into_owned()
}

/// Parse items-not-found rows and keep the `limit` worst by INF units.
pub fn parse_inventory_rows(
    rows: &[Vec<String>],
    columns: &InventoryColumns,
    limit: usize,
    thumbnail_size: u32,
) -> ParsedRows<InventoryItem> {
    let width = columns.width();
    let mut items = Vec::new();
    let mut malformed = 0;

    for row in rows {
        if row.len() <= 1 {
            continue;
        }
        if row.len() < width {
            malformed += 1;
            continue;
        }

        let sku = row[columns.sku].trim();
        let Some(inf_units) = parse_number(&row[columns.inf_units]) else {
            malformed += 1;
            continue;
        };

        items.push(InventoryItem {
            sku: sku.to_string(),
            product_name: row[columns.product_name].trim().to_string(),
            image_url: resize_thumbnail(row[columns.image].trim(), thumbnail_size),
            inf_units,
            orders_impacted: parse_number(&row[columns.orders_impacted]).unwrap_or(0.0) as u64,
            inf_rate: parse_number(&row[columns.inf_rate]).unwrap_or(0.0),
        });
    }

    items.sort_by(|a, b| b.inf_units.total_cmp(&a.inf_units));
    items.truncate(limit);
    ParsedRows { items, malformed }
}
