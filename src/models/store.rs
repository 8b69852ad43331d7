use serde::{Deserialize, Serialize};

/// One store whose dashboard metrics are collected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StoreTarget {
    pub merchant_id: String,
    pub marketplace_id: String,
    #[serde(alias = "store_name")]
    pub name: String,
}

impl StoreTarget {
    pub fn new(
        merchant_id: impl Into<String>,
        marketplace_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            marketplace_id: marketplace_id.into(),
            name: name.into(),
        }
    }

    /// `(merchant_id, marketplace_id)` uniquely identifies a store.
    pub fn key(&self) -> (&str, &str) {
        (&self.merchant_id, &self.marketplace_id)
    }

    /// "Amazon Fresh - Leeds" is shown as "Leeds" in chat messages.
    pub fn short_name(&self) -> &str {
        self.name
            .split_once(" - ")
            .map(|(_, short)| short.trim())
            .filter(|short| !short.is_empty())
            .unwrap_or(self.name.as_str())
    }
}
