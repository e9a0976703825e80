use std::sync::Arc;

use parking_lot::RwLock;

pub const SECTIONS: [(&str, &str); 6] = [
    ("home", "Home"),
    ("posts", "Posts"),
    ("comments", "Comments"),
    ("tags", "Tags"),
    ("users", "Users"),
    ("help", "Help"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavItem {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Default)]
struct State {
    items: Vec<NavItem>,
    active: Option<String>,
}

/// Top-level section bar. Controllers declare the section they belong to and
/// the terminal chrome highlights it.
#[derive(Debug, Clone, Default)]
pub struct TopNavigation {
    state: Arc<RwLock<State>>,
}

impl TopNavigation {
    pub fn new() -> Self {
        let items = SECTIONS
            .iter()
            .map(|(key, name)| NavItem {
                key: key.to_string(),
                name: name.to_string(),
            })
            .collect();
        Self {
            state: Arc::new(RwLock::new(State {
                items,
                active: None,
            })),
        }
    }

    /// Unknown section names are accepted and simply highlight nothing.
    pub fn activate(&self, section: &str) {
        self.state.write().active = Some(section.to_string());
    }

    pub fn active(&self) -> Option<String> {
        self.state.read().active.clone()
    }

    pub fn items(&self) -> Vec<NavItem> {
        self.state.read().items.clone()
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.state.read().active.as_deref() == Some(key)
    }
}
