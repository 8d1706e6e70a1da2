//! Audit records and the shapes of history reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Page size used when a read does not ask for one.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// One transition of one entity. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    /// Identifier of the entity that transitioned.
    pub ref_id: String,
    /// State reached.
    pub lifecycle: String,
    /// When the transition took effect.
    pub date: DateTime<Utc>,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(ref_id: impl Into<String>, lifecycle: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ref_id: ref_id.into(),
            lifecycle: lifecycle.into(),
            date,
            created_at: Utc::now(),
        }
    }
}

/// Offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    pub fn new(skip: usize, limit: usize) -> Self {
        Self { skip, limit }
    }

    /// Slice `items` to this page, returning the total count alongside.
    pub fn apply<T>(&self, items: Vec<T>) -> Paged<T> {
        let total = items.len();
        let data = items.into_iter().skip(self.skip).take(self.limit).collect();
        Paged { total, data }
    }
}

/// A page of results together with the unpaginated total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paged<T> {
    pub total: usize,
    pub data: Vec<T>,
}

impl<T> Paged<T> {
    pub fn empty() -> Self {
        Self {
            total: 0,
            data: Vec::new(),
        }
    }
}

/// Count of history entries reaching one state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleStat {
    pub lifecycle: String,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults_when_missing() {
        let page: Page = serde_json::from_str("{}").unwrap();
        assert_eq!(page, Page::default());
        let page: Page = serde_json::from_str(r#"{"skip":5}"#).unwrap();
        assert_eq!(page, Page::new(5, DEFAULT_PAGE_LIMIT));
    }

    #[test]
    fn test_page_apply_reports_total() {
        let paged = Page::new(2, 2).apply((0..5).collect());
        assert_eq!(paged.total, 5);
        assert_eq!(paged.data, vec![2, 3]);

        let paged = Page::new(10, 2).apply((0..5).collect::<Vec<i32>>());
        assert_eq!(paged.total, 5);
        assert!(paged.data.is_empty());
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let entry = HistoryEntry::new("u1", "O", Utc::now());
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["refId"], "u1");
        assert!(value.get("createdAt").is_some());
    }
}
