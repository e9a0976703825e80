use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Rating category -> whether posts of that rating are shown while browsing.
///
/// Iteration follows insertion order, which is the order categories appear in
/// the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SafetyPreferences(IndexMap<String, bool>);

impl Default for SafetyPreferences {
    fn default() -> Self {
        [("safe", true), ("sketchy", true), ("unsafe", false)]
            .into_iter()
            .collect()
    }
}

impl SafetyPreferences {
    pub fn empty() -> Self {
        Self(IndexMap::new())
    }

    pub fn set(&mut self, category: impl Into<String>, shown: bool) {
        self.0.insert(category.into(), shown);
    }

    pub fn is_shown(&self, category: &str) -> Option<bool> {
        self.0.get(category).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(name, shown)| (name.as_str(), *shown))
    }

    /// Categories the user has opted to hide.
    pub fn disabled(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, shown)| !*shown)
            .map(|(name, _)| name)
    }
}

impl<K: Into<String>> FromIterator<(K, bool)> for SafetyPreferences {
    fn from_iter<I: IntoIterator<Item = (K, bool)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, shown)| (name.into(), shown))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub list_posts: SafetyPreferences,
}

/// Shared, explicitly passed settings. Readers take a snapshot with
/// [`Handle::get`] each time they need current preferences.
#[derive(Debug, Clone, Default)]
pub struct Handle {
    inner: Arc<RwLock<Settings>>,
}

impl Handle {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn get(&self) -> Settings {
        self.inner.read().clone()
    }

    pub fn update<F>(&self, apply: F)
    where
        F: FnOnce(&mut Settings),
    {
        apply(&mut self.inner.write());
    }
}
