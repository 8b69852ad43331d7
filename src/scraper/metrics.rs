use crate::config::MetricsColumns;
use crate::models::{units_per_hour, ShopperMetrics};

/// Placeholder the dashboard shows for rows it cannot attribute.
pub const NAME_PLACEHOLDER: &str = "SHOPPER_NAME_NOT_FOUND";

/// Rows kept from a table, plus the count that did not fit the layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRows<T> {
    pub items: Vec<T>,
    pub malformed: usize,
}

impl<T> ParsedRows<T> {
    /// Every data row failed to parse: the table no longer has the expected shape.
    pub fn layout_changed(&self, total_rows: usize) -> bool {
        total_rows > 0 && self.items.is_empty() && self.malformed == total_rows
    }
}

/// Lenient numeric cell parsing: "1,240", "2.5 %" and " 17 " all parse.
pub fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

fn cell<'a>(row: &'a [String], index: usize) -> &'a str {
    row.get(index).map(String::as_str).unwrap_or("")
}

/// Turn per-shopper table rows into metrics, sorted by INF rate ascending.
///
/// Unattributed rows and shoppers without orders are dropped.
pub fn parse_shopper_rows(rows: &[Vec<String>], columns: &MetricsColumns) -> ParsedRows<ShopperMetrics> {
    let width = columns.width();
    let mut items = Vec::new();
    let mut malformed = 0;

    for row in rows {
        // Single-cell rows are "no data" notices
        if row.len() <= 1 {
            continue;
        }
        if row.len() < width {
            malformed += 1;
            continue;
        }

        let name = cell(row, columns.name).trim();
        if name.is_empty() || name == NAME_PLACEHOLDER {
            continue;
        }

        let Some(orders) = parse_number(cell(row, columns.orders)) else {
            malformed += 1;
            continue;
        };
        if orders <= 0.0 {
            continue;
        }

        let units = parse_number(cell(row, columns.units)).unwrap_or(0.0);
        let pick_time_secs = parse_number(cell(row, columns.pick_time_secs)).unwrap_or(0.0);

        items.push(ShopperMetrics {
            name: name.to_string(),
            orders: orders as u64,
            units,
            pick_time_secs,
            requested_units: parse_number(cell(row, columns.requested_units)).unwrap_or(0.0),
            uph: units_per_hour(units, pick_time_secs),
            inf_rate: parse_number(cell(row, columns.inf_rate)).unwrap_or(0.0),
            late_rate: parse_number(cell(row, columns.late_rate)).unwrap_or(0.0),
        });
    }

    items.sort_by(|a, b| a.inf_rate.total_cmp(&b.inf_rate));
    ParsedRows { items, malformed }
}
