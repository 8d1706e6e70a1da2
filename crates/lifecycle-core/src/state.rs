//! Lifecycle states: the built-in enumeration and the custom state catalog.

use serde::{Deserialize, Serialize};

/// States every deployment knows about, independent of configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuiltinState {
    /// Created but not yet confirmed by an authoritative source.
    Provisional,
    /// Active account.
    Active,
    /// Confirmed by an authoritative source.
    Official,
    /// Waiting for an external decision.
    Wait,
    /// Disabled account.
    Inactive,
    /// Marked for deletion.
    Deleted,
    /// Managed by hand, excluded from source synchronisation.
    Manual,
    /// Kept for records only.
    Archived,
}

impl BuiltinState {
    /// Every built-in state, in declaration order.
    pub const ALL: [BuiltinState; 8] = [
        BuiltinState::Provisional,
        BuiltinState::Active,
        BuiltinState::Official,
        BuiltinState::Wait,
        BuiltinState::Inactive,
        BuiltinState::Deleted,
        BuiltinState::Manual,
        BuiltinState::Archived,
    ];

    /// One-character key stored in the `lifecycle` field.
    pub fn key(&self) -> &'static str {
        match self {
            BuiltinState::Provisional => "P",
            BuiltinState::Active => "A",
            BuiltinState::Official => "O",
            BuiltinState::Wait => "W",
            BuiltinState::Inactive => "I",
            BuiltinState::Deleted => "D",
            BuiltinState::Manual => "M",
            BuiltinState::Archived => "X",
        }
    }

    /// Symbolic name accepted in rule documents.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinState::Provisional => "PROVISIONAL",
            BuiltinState::Active => "ACTIVE",
            BuiltinState::Official => "OFFICIAL",
            BuiltinState::Wait => "WAIT",
            BuiltinState::Inactive => "INACTIVE",
            BuiltinState::Deleted => "DELETED",
            BuiltinState::Manual => "MANUAL",
            BuiltinState::Archived => "ARCHIVED",
        }
    }

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            BuiltinState::Provisional => "Provisional",
            BuiltinState::Active => "Active",
            BuiltinState::Official => "Official",
            BuiltinState::Wait => "Waiting",
            BuiltinState::Inactive => "Inactive",
            BuiltinState::Deleted => "Deleted",
            BuiltinState::Manual => "Manual",
            BuiltinState::Archived => "Archived",
        }
    }

    /// Longer description shown next to the label.
    pub fn description(&self) -> &'static str {
        match self {
            BuiltinState::Provisional => "Identity created, awaiting confirmation",
            BuiltinState::Active => "Identity is active and synchronised",
            BuiltinState::Official => "Identity confirmed by an authoritative source",
            BuiltinState::Wait => "Identity is waiting for a decision",
            BuiltinState::Inactive => "Identity is disabled",
            BuiltinState::Deleted => "Identity is marked for deletion",
            BuiltinState::Manual => "Identity is managed manually",
            BuiltinState::Archived => "Identity is archived",
        }
    }

    /// Look up a built-in state by its key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }

    /// Look up a built-in state by its symbolic name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }

    /// Materialize as a [`LifecycleState`].
    pub fn to_state(&self) -> LifecycleState {
        LifecycleState {
            key: self.key().to_string(),
            label: self.label().to_string(),
            description: self.description().to_string(),
            icon: None,
            color: None,
        }
    }
}

/// A named point in an identity's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleState {
    /// Exactly one character, unique across built-in and custom states.
    pub key: String,
    /// Display label.
    pub label: String,
    /// Longer description.
    pub description: String,
    /// Optional icon name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Optional color (hex).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl LifecycleState {
    /// Create a state with no icon or color.
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            description: description.into(),
            icon: None,
            color: None,
        }
    }
}

/// Custom states loaded from the catalog document, plus the catalog file's
/// modification time (milliseconds since the epoch, `0` when absent).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateCatalog {
    custom: Vec<LifecycleState>,
    modified_ms: u64,
}

impl StateCatalog {
    /// Create a catalog from already validated custom states.
    pub fn new(custom: Vec<LifecycleState>, modified_ms: u64) -> Self {
        Self {
            custom,
            modified_ms,
        }
    }

    /// A catalog with no custom states.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Modification time of the catalog file this was parsed from.
    pub fn modified_ms(&self) -> u64 {
        self.modified_ms
    }

    /// Custom states in catalog order.
    pub fn custom_states(&self) -> &[LifecycleState] {
        &self.custom
    }

    /// Keys of the custom states, in catalog order.
    pub fn custom_keys(&self) -> Vec<&str> {
        self.custom.iter().map(|s| s.key.as_str()).collect()
    }

    /// Built-in states followed by custom states.
    pub fn all_states(&self) -> Vec<LifecycleState> {
        BuiltinState::ALL
            .iter()
            .map(BuiltinState::to_state)
            .chain(self.custom.iter().cloned())
            .collect()
    }

    /// Every known key, built-in first.
    pub fn all_keys(&self) -> Vec<String> {
        BuiltinState::ALL
            .iter()
            .map(|s| s.key().to_string())
            .chain(self.custom.iter().map(|s| s.key.clone()))
            .collect()
    }

    /// Whether `key` names a built-in or custom state.
    pub fn contains(&self, key: &str) -> bool {
        BuiltinState::from_key(key).is_some() || self.custom.iter().any(|s| s.key == key)
    }

    /// Resolve a state reference from a rule document to its key.
    ///
    /// Accepts a key (built-in or custom) or a built-in symbolic name such as `OFFICIAL`.
    pub fn resolve(&self, reference: &str) -> Option<String> {
        if self.contains(reference) {
            return Some(reference.to_string());
        }
        BuiltinState::from_name(reference).map(|s| s.key().to_string())
    }
}
