use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type PostId = u64;
pub type CommentId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Safety {
    #[default]
    Safe,
    Sketchy,
    Unsafe,
}

impl Safety {
    pub fn as_str(&self) -> &'static str {
        match self {
            Safety::Safe => "safe",
            Safety::Sketchy => "sketchy",
            Safety::Unsafe => "unsafe",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MicroUser {
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MicroTag {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub usages: i64,
}

impl MicroTag {
    pub fn primary_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or_default()
    }
}

/// A content item together with the comments the server returned for it.
///
/// `comments` keeps server order, which is also display order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content_url: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<MicroUser>,
    #[serde(default)]
    pub tags: Vec<MicroTag>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub own_score: i32,
    #[serde(default)]
    pub favorite_count: i64,
    #[serde(default)]
    pub own_favorite: bool,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Post {
    pub fn comment(&self, id: CommentId) -> Option<&Comment> {
        self.comments.iter().find(|comment| comment.id == Some(id))
    }

    pub fn comment_mut(&mut self, id: CommentId) -> Option<&mut Comment> {
        self.comments.iter_mut().find(|comment| comment.id == Some(id))
    }

    /// Appends a persisted comment. Comments that belong to another post, or
    /// that are already present, are rejected.
    pub fn add_comment(&mut self, comment: Comment) -> bool {
        if comment.post_id != self.id {
            return false;
        }
        if let Some(id) = comment.id {
            if self.comment(id).is_some() {
                return false;
            }
        }
        self.comments.push(comment);
        self.comment_count += 1;
        true
    }

    pub fn replace_comment(&mut self, comment: Comment) -> bool {
        let Some(id) = comment.id else {
            return false;
        };
        match self.comment_mut(id) {
            Some(slot) => {
                *slot = comment;
                true
            }
            None => false,
        }
    }

    pub fn remove_comment(&mut self, id: CommentId) -> Option<Comment> {
        let index = self
            .comments
            .iter()
            .position(|comment| comment.id == Some(id))?;
        self.comment_count = (self.comment_count - 1).max(0);
        Some(self.comments.remove(index))
    }

    /// Takes the score fields from a server reply to a score action. Favorite
    /// state is owned by favorite replies and is left alone, as is the
    /// comment collection.
    pub fn apply_score(&mut self, fresh: &Post) {
        self.version = self.version.max(fresh.version);
        self.score = fresh.score;
        self.own_score = fresh.own_score;
    }

    /// Takes the favorite fields from a server reply to a favorite or
    /// unfavorite action.
    pub fn apply_favorite(&mut self, fresh: &Post) {
        self.version = self.version.max(fresh.version);
        self.favorite_count = fresh.favorite_count;
        self.own_favorite = fresh.own_favorite;
    }

    /// Takes only the score fields of a scored comment. Returns `false` when
    /// the comment is not part of this post.
    pub fn apply_comment_score(&mut self, scored: &Comment) -> bool {
        let Some(id) = scored.id else {
            return false;
        };
        match self.comment_mut(id) {
            Some(comment) => {
                comment.apply_score(scored);
                true
            }
            None => false,
        }
    }

    pub fn tag_names(&self) -> Vec<&str> {
        self.tags
            .iter()
            .map(MicroTag::primary_name)
            .filter(|name| !name.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Absent until the comment has been persisted.
    #[serde(default)]
    pub id: Option<CommentId>,
    #[serde(default)]
    pub version: u64,
    pub post_id: PostId,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub own_score: i32,
    #[serde(default)]
    pub user: Option<MicroUser>,
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_edit_time: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn draft(post_id: PostId) -> Self {
        Self {
            post_id,
            ..Self::default()
        }
    }

    pub fn apply_score(&mut self, scored: &Comment) {
        self.version = self.version.max(scored.version);
        self.score = scored.score;
        self.own_score = scored.own_score;
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn author(&self) -> &str {
        self.user
            .as_ref()
            .map(|user| user.name.as_str())
            .unwrap_or("anonymous")
    }
}

/// Neighbouring post ids under the decorated browsing query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SiblingPair {
    pub prev: Option<PostId>,
    pub next: Option<PostId>,
}
