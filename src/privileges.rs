use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const EDIT_POSTS: &str = "posts:edit";
pub const LIST_COMMENTS: &str = "comments:list";
pub const CREATE_COMMENTS: &str = "comments:create";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    #[default]
    Anonymous,
    Restricted,
    Regular,
    Power,
    Moderator,
    Administrator,
    Nobody,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown rank {0:?}")]
pub struct UnknownRank(pub String);

impl FromStr for Rank {
    type Err = UnknownRank;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anonymous" => Ok(Rank::Anonymous),
            "restricted" => Ok(Rank::Restricted),
            "regular" => Ok(Rank::Regular),
            "power" => Ok(Rank::Power),
            "moderator" => Ok(Rank::Moderator),
            "administrator" => Ok(Rank::Administrator),
            "nobody" => Ok(Rank::Nobody),
            other => Err(UnknownRank(other.to_string())),
        }
    }
}

/// Synchronous capability check against the server's privilege table.
pub trait PrivilegeCheck: Send + Sync {
    fn has_privilege(&self, name: &str) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct Privileges {
    required: HashMap<String, Rank>,
    rank: Rank,
}

impl Privileges {
    pub fn new(required: HashMap<String, Rank>, rank: Rank) -> Self {
        Self { required, rank }
    }

    /// Builds the table from the server's `privilege -> rank name` mapping,
    /// skipping entries whose rank is not recognised.
    pub fn from_names(table: &HashMap<String, String>, rank: Rank) -> Self {
        let mut required = HashMap::with_capacity(table.len());
        for (privilege, rank_name) in table {
            match rank_name.parse::<Rank>() {
                Ok(min) => {
                    required.insert(privilege.clone(), min);
                }
                Err(err) => warn!(privilege = %privilege, %err, "ignoring privilege entry"),
            }
        }
        Self { required, rank }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }
}

impl PrivilegeCheck for Privileges {
    /// `name` matches every privilege key it prefixes; the lowest rank among
    /// those keys decides.
    fn has_privilege(&self, name: &str) -> bool {
        let minimum = self
            .required
            .iter()
            .filter(|(privilege, _)| privilege.starts_with(name))
            .map(|(_, rank)| *rank)
            .min();
        match minimum {
            Some(minimum) => self.rank >= minimum,
            None => {
                warn!(privilege = name, "unknown privilege");
                false
            }
        }
    }
}

/// Grants everything. Used for the offline sample session.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PrivilegeCheck for AllowAll {
    fn has_privilege(&self, _name: &str) -> bool {
        true
    }
}

/// The three flags the post detail view is built with. Resolved once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub can_edit_posts: bool,
    pub can_list_comments: bool,
    pub can_create_comments: bool,
}

impl Capabilities {
    pub fn resolve(check: &dyn PrivilegeCheck) -> Self {
        Self {
            can_edit_posts: check.has_privilege(EDIT_POSTS),
            can_list_comments: check.has_privilege(LIST_COMMENTS),
            can_create_comments: check.has_privilege(CREATE_COMMENTS),
        }
    }
}
