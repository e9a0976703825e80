use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use parking_lot::Mutex;

use crate::api;
use crate::models::{Comment, CommentId, MicroTag, MicroUser, Post, PostId, Safety, SiblingPair};

pub trait PostService: Send + Sync {
    fn load_post(&self, id: PostId) -> Result<Post>;
    fn load_around(&self, id: PostId, query: &str) -> Result<SiblingPair>;
}

pub trait CommentService: Send + Sync {
    fn create(&self, draft: &Comment) -> Result<Comment>;
    fn update(&self, comment: &Comment) -> Result<Comment>;
    fn delete(&self, comment: &Comment) -> Result<()>;
    fn set_score(&self, comment: &Comment, score: i32) -> Result<Comment>;
}

/// Post-level actions. Each returns the server's fresh copy of the post.
pub trait InteractionService: Send + Sync {
    fn set_score(&self, post: PostId, score: i32) -> Result<Post>;
    fn add_to_favorites(&self, post: PostId) -> Result<Post>;
    fn remove_from_favorites(&self, post: PostId) -> Result<Post>;
}

pub struct ApiPostService {
    client: Arc<api::Client>,
}

impl ApiPostService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl PostService for ApiPostService {
    fn load_post(&self, id: PostId) -> Result<Post> {
        self.client.post(id)
    }

    fn load_around(&self, id: PostId, query: &str) -> Result<SiblingPair> {
        self.client.around(id, query)
    }
}

pub struct ApiCommentService {
    client: Arc<api::Client>,
}

impl ApiCommentService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for ApiCommentService {
    fn create(&self, draft: &Comment) -> Result<Comment> {
        self.client.create_comment(draft.post_id, &draft.text)
    }

    fn update(&self, comment: &Comment) -> Result<Comment> {
        let id = persisted_id(comment)?;
        self.client.update_comment(id, comment.version, &comment.text)
    }

    fn delete(&self, comment: &Comment) -> Result<()> {
        let id = persisted_id(comment)?;
        self.client.delete_comment(id, comment.version)
    }

    fn set_score(&self, comment: &Comment, score: i32) -> Result<Comment> {
        let id = persisted_id(comment)?;
        self.client.set_comment_score(id, score)
    }
}

fn persisted_id(comment: &Comment) -> Result<CommentId> {
    comment
        .id
        .ok_or_else(|| anyhow!("This comment has not been saved yet."))
}

pub struct ApiInteractionService {
    client: Arc<api::Client>,
}

impl ApiInteractionService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl InteractionService for ApiInteractionService {
    fn set_score(&self, post: PostId, score: i32) -> Result<Post> {
        self.client.set_post_score(post, score)
    }

    fn add_to_favorites(&self, post: PostId) -> Result<Post> {
        self.client.add_favorite(post)
    }

    fn remove_from_favorites(&self, post: PostId) -> Result<Post> {
        self.client.remove_favorite(post)
    }
}

/// Posts held in memory and shared between the mock services, so that a
/// comment or favorite made through one is seen when the post is loaded
/// again through another.
#[derive(Clone, Default)]
pub struct PostStore {
    posts: Arc<Mutex<HashMap<PostId, Post>>>,
}

impl PostStore {
    pub fn new(posts: impl IntoIterator<Item = Post>) -> Self {
        let store = Self::default();
        for post in posts {
            store.insert(post);
        }
        store
    }

    pub fn insert(&self, post: Post) {
        self.posts.lock().insert(post.id, post);
    }

    pub fn get(&self, id: PostId) -> Option<Post> {
        self.posts.lock().get(&id).cloned()
    }

    /// Runs `change` against the stored post, if there is one.
    pub fn update<R>(&self, id: PostId, change: impl FnOnce(&mut Post) -> R) -> Option<R> {
        self.posts.lock().get_mut(&id).map(change)
    }
}

/// In-memory post source. Failures are reported with the configured
/// description, the same way a server would describe them.
#[derive(Default)]
pub struct MockPostService {
    posts: PostStore,
    around: Mutex<HashMap<PostId, SiblingPair>>,
    post_failure: Mutex<Option<String>>,
    around_failure: Mutex<Option<String>>,
    queries: Mutex<Vec<String>>,
}

impl MockPostService {
    pub fn with_post(post: Post, siblings: SiblingPair) -> Self {
        let service = Self::default();
        service.insert(post, siblings);
        service
    }

    pub fn insert(&self, post: Post, siblings: SiblingPair) {
        self.around.lock().insert(post.id, siblings);
        self.posts.insert(post);
    }

    /// The store this service reads from; hand it to the other mocks to have
    /// their changes show up on reload.
    pub fn store(&self) -> PostStore {
        self.posts.clone()
    }

    pub fn fail_post(self, description: impl Into<String>) -> Self {
        *self.post_failure.lock() = Some(description.into());
        self
    }

    pub fn fail_around(self, description: impl Into<String>) -> Self {
        *self.around_failure.lock() = Some(description.into());
        self
    }

    /// Every query `load_around` was called with, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

impl PostService for MockPostService {
    fn load_post(&self, id: PostId) -> Result<Post> {
        if let Some(description) = self.post_failure.lock().clone() {
            bail!(description);
        }
        self.posts
            .get(id)
            .ok_or_else(|| api::ApiError::NotFound(format!("Post {id} not found.")).into())
    }

    fn load_around(&self, id: PostId, query: &str) -> Result<SiblingPair> {
        self.queries.lock().push(query.to_string());
        if let Some(description) = self.around_failure.lock().clone() {
            bail!(description);
        }
        Ok(self.around.lock().get(&id).copied().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MockCommentService {
    next_id: AtomicU64,
    failure: Mutex<Option<String>>,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
    store: Option<PostStore>,
}

impl MockCommentService {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            ..Self::default()
        }
    }

    pub fn failing(description: impl Into<String>) -> Self {
        let service = Self::new();
        *service.failure.lock() = Some(description.into());
        service
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = Some(latency);
        self
    }

    /// Writes every successful change back into `store`.
    pub fn with_store(self, store: PostStore) -> Self {
        Self {
            store: Some(store),
            ..self
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn begin(&self, call: String) -> Result<()> {
        self.calls.lock().push(call);
        if let Some(latency) = *self.latency.lock() {
            thread::sleep(latency);
        }
        match self.failure.lock().clone() {
            Some(description) => bail!(description),
            None => Ok(()),
        }
    }

    fn persist<F>(&self, post_id: PostId, change: F)
    where
        F: FnOnce(&mut Post),
    {
        if let Some(store) = &self.store {
            store.update(post_id, change);
        }
    }
}

impl CommentService for MockCommentService {
    fn create(&self, draft: &Comment) -> Result<Comment> {
        self.begin(format!("create:{}", draft.post_id))?;
        let mut comment = draft.clone();
        comment.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
        comment.version = 1;
        self.persist(comment.post_id, |post| {
            post.add_comment(comment.clone());
        });
        Ok(comment)
    }

    fn update(&self, comment: &Comment) -> Result<Comment> {
        let id = persisted_id(comment)?;
        self.begin(format!("update:{id}"))?;
        let mut saved = comment.clone();
        saved.version += 1;
        self.persist(saved.post_id, |post| {
            post.replace_comment(saved.clone());
        });
        Ok(saved)
    }

    fn delete(&self, comment: &Comment) -> Result<()> {
        let id = persisted_id(comment)?;
        self.begin(format!("delete:{id}"))?;
        self.persist(comment.post_id, |post| {
            post.remove_comment(id);
        });
        Ok(())
    }

    fn set_score(&self, comment: &Comment, score: i32) -> Result<Comment> {
        let id = persisted_id(comment)?;
        self.begin(format!("score:{id}:{score}"))?;
        let mut scored = comment.clone();
        scored.score += i64::from(score - comment.own_score);
        scored.own_score = score;
        self.persist(scored.post_id, |post| {
            post.apply_comment_score(&scored);
        });
        Ok(scored)
    }
}

/// Applies score and favorite changes to a [`PostStore`], mirroring what a
/// server would return.
#[derive(Default)]
pub struct MockInteractionService {
    posts: PostStore,
    failure: Mutex<Option<String>>,
    latency: Mutex<HashMap<&'static str, Duration>>,
    calls: Mutex<Vec<String>>,
}

impl MockInteractionService {
    pub fn new(posts: impl IntoIterator<Item = Post>) -> Self {
        Self::with_store(PostStore::new(posts))
    }

    pub fn with_store(posts: PostStore) -> Self {
        Self {
            posts,
            ..Self::default()
        }
    }

    pub fn failing(self, description: impl Into<String>) -> Self {
        *self.failure.lock() = Some(description.into());
        self
    }

    /// Delays one operation (`"score"`, `"favorite"`, or `"unfavorite"`).
    pub fn with_latency(self, operation: &'static str, latency: Duration) -> Self {
        self.latency.lock().insert(operation, latency);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn apply<F>(&self, operation: &'static str, id: PostId, change: F) -> Result<Post>
    where
        F: FnOnce(&mut Post),
    {
        self.calls.lock().push(format!("{operation}:{id}"));
        let latency = self.latency.lock().get(operation).copied();
        if let Some(latency) = latency {
            thread::sleep(latency);
        }
        if let Some(description) = self.failure.lock().clone() {
            bail!(description);
        }
        self.posts
            .update(id, |post| {
                change(post);
                post.clone()
            })
            .ok_or_else(|| api::ApiError::NotFound(format!("Post {id} not found.")).into())
    }
}

impl InteractionService for MockInteractionService {
    fn set_score(&self, post: PostId, score: i32) -> Result<Post> {
        self.apply("score", post, |post| {
            post.score += i64::from(score - post.own_score);
            post.own_score = score;
        })
    }

    fn add_to_favorites(&self, post: PostId) -> Result<Post> {
        self.apply("favorite", post, |post| {
            if !post.own_favorite {
                post.own_favorite = true;
                post.favorite_count += 1;
            }
        })
    }

    fn remove_from_favorites(&self, post: PostId) -> Result<Post> {
        self.apply("unfavorite", post, |post| {
            if post.own_favorite {
                post.own_favorite = false;
                post.favorite_count = (post.favorite_count - 1).max(0);
            }
        })
    }
}

/// Three linked posts for browsing without a server.
pub fn sample_posts() -> Vec<(Post, SiblingPair)> {
    let ids = [1, 2, 3];
    ids.iter()
        .enumerate()
        .map(|(index, id)| {
            let post = sample_post(*id);
            let siblings = SiblingPair {
                prev: index.checked_sub(1).map(|i| ids[i]),
                next: ids.get(index + 1).copied(),
            };
            (post, siblings)
        })
        .collect()
}

fn sample_post(id: PostId) -> Post {
    let welcome = Comment {
        id: Some(id * 100),
        version: 1,
        post_id: id,
        text: format!(
            "Welcome to post **#{id}**.\n\nPress `c` to write a comment, `e` to edit this one."
        ),
        score: 1,
        user: Some(MicroUser {
            name: "booru-view".into(),
            avatar_url: None,
        }),
        ..Comment::default()
    };
    Post {
        id,
        version: 1,
        safety: Safety::Safe,
        kind: "image".into(),
        content_url: format!("data/posts/{id}.png"),
        source: Some("https://example.invalid/".into()),
        user: Some(MicroUser {
            name: "sample".into(),
            avatar_url: None,
        }),
        tags: vec![MicroTag {
            names: vec!["sample".into()],
            category: "default".into(),
            usages: 3,
        }],
        score: 0,
        favorite_count: 0,
        comment_count: 1,
        comments: vec![welcome],
        ..Post::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_post_failures_keep_description() {
        let (post, siblings) = sample_posts().remove(0);
        let service = MockPostService::with_post(post, siblings).fail_around("server unreachable");
        assert!(service.load_post(1).is_ok());
        let err = service.load_around(1, "-rating:unsafe").unwrap_err();
        assert_eq!(err.to_string(), "server unreachable");
        assert_eq!(service.queries(), vec!["-rating:unsafe".to_string()]);
        assert_eq!(service.load_post(9).unwrap_err().to_string(), "Post 9 not found.");

        let (post, siblings) = sample_posts().remove(1);
        let service = MockPostService::with_post(post, siblings).fail_post("maintenance");
        assert_eq!(service.load_post(2).unwrap_err().to_string(), "maintenance");
    }

    #[test]
    fn mock_interactions_own_score_changes() {
        let posts: Vec<Post> = sample_posts().into_iter().map(|(post, _)| post).collect();
        let service = MockInteractionService::new(posts);
        assert_eq!(service.set_score(1, 1).unwrap().score, 1);
        assert_eq!(service.set_score(1, -1).unwrap().score, -1);
        let favorited = service.add_to_favorites(1).unwrap();
        assert!(favorited.own_favorite);
        assert_eq!(favorited.favorite_count, 1);
        assert_eq!(service.remove_from_favorites(1).unwrap().favorite_count, 0);
        assert_eq!(
            service.calls(),
            vec!["score:1", "score:1", "favorite:1", "unfavorite:1"]
        );
    }

    #[test]
    fn mock_comments_assign_ids() {
        let service = MockCommentService::new();
        let mut draft = Comment::draft(5);
        draft.text = "hi".into();
        let created = service.create(&draft).unwrap();
        assert!(created.is_persisted());
        assert_eq!(created.post_id, 5);
        assert!(service.update(&draft).is_err());
    }

    #[test]
    fn shared_store_sees_comment_and_favorite_changes() {
        let (post, siblings) = sample_posts().remove(0);
        let posts = MockPostService::with_post(post, siblings);
        let comments = MockCommentService::new().with_store(posts.store());
        let interactions = MockInteractionService::with_store(posts.store());

        let mut draft = Comment::draft(1);
        draft.text = "stored".into();
        let created = comments.create(&draft).unwrap();
        comments.set_score(&created, 1).unwrap();
        interactions.add_to_favorites(1).unwrap();

        let reloaded = posts.load_post(1).unwrap();
        assert!(reloaded.own_favorite);
        assert_eq!(reloaded.comment_count, 2);
        assert_eq!(reloaded.comment(1000).map(|c| c.own_score), Some(1));

        comments.delete(&created).unwrap();
        assert!(posts.load_post(1).unwrap().comment(1000).is_none());
    }

    #[test]
    fn sample_posts_are_linked() {
        let posts = sample_posts();
        assert_eq!(posts[0].1, SiblingPair { prev: None, next: Some(2) });
        assert_eq!(posts[1].1, SiblingPair { prev: Some(1), next: Some(3) });
        assert_eq!(posts[2].1.next, None);
    }
}
