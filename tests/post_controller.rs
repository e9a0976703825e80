use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use parking_lot::Mutex;

use booru_view::controller::{Controller, Phase, Services};
use booru_view::data::{
    CommentService, InteractionService, MockCommentService, MockInteractionService,
    MockPostService, PostService,
};
use booru_view::models::{Comment, CommentId, Post, PostId, SiblingPair};
use booru_view::navigation::TopNavigation;
use booru_view::privileges::{AllowAll, PrivilegeCheck, Privileges, Rank};
use booru_view::query;
use booru_view::routes::{Route, Router};
use booru_view::settings::{self, SafetyPreferences, Settings};
use booru_view::view::{
    CommentFormControl, CommentFormEvent, CommentListControl, CommentListEvent, DetailView,
    DetailViewParams, EmptyView, SidebarControl, SidebarEvent, ViewEvent, ViewFactory,
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    DetailBuilt {
        post: PostId,
        edit_mode: bool,
        prev: Option<PostId>,
        next: Option<PostId>,
        can_edit_posts: bool,
        can_list_comments: bool,
        can_create_comments: bool,
    },
    EmptyBuilt,
    EmptyError(String),
    SidebarChanged {
        score: i64,
        own_score: i32,
        favorite_count: i64,
        own_favorite: bool,
    },
    FormText(String),
    FormError(String),
    FormEnabled(bool),
    ListChanged(Vec<CommentId>),
    RowError(CommentId, String),
    RowEnabled(CommentId, bool),
    Alert(String),
}

type Log = Arc<Mutex<Vec<Call>>>;

#[derive(Clone)]
struct Recorder {
    log: Log,
    sidebar: bool,
    form: bool,
    list: bool,
}

impl Recorder {
    fn new() -> Self {
        Self {
            log: Log::default(),
            sidebar: true,
            form: true,
            list: true,
        }
    }

    fn without_form() -> Self {
        Self {
            form: false,
            ..Self::new()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.log.lock().clone()
    }

    fn alerts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Alert(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

struct Part(Log);

impl SidebarControl for Part {
    fn post_changed(&mut self, post: &Post) {
        self.0.lock().push(Call::SidebarChanged {
            score: post.score,
            own_score: post.own_score,
            favorite_count: post.favorite_count,
            own_favorite: post.own_favorite,
        });
    }
}

impl CommentFormControl for Part {
    fn set_text(&mut self, text: &str) {
        self.0.lock().push(Call::FormText(text.to_string()));
    }

    fn show_error(&mut self, description: &str) {
        self.0.lock().push(Call::FormError(description.to_string()));
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.0.lock().push(Call::FormEnabled(enabled));
    }
}

impl CommentListControl for Part {
    fn comments_changed(&mut self, post: &Post) {
        let ids = post.comments.iter().filter_map(|c| c.id).collect();
        self.0.lock().push(Call::ListChanged(ids));
    }

    fn show_error(&mut self, comment: CommentId, description: &str) {
        self.0
            .lock()
            .push(Call::RowError(comment, description.to_string()));
    }

    fn set_row_enabled(&mut self, comment: CommentId, enabled: bool) {
        self.0.lock().push(Call::RowEnabled(comment, enabled));
    }
}

struct RecordingView {
    log: Log,
    sidebar: Option<Part>,
    form: Option<Part>,
    list: Option<Part>,
}

impl DetailView for RecordingView {
    fn sidebar(&mut self) -> Option<&mut dyn SidebarControl> {
        self.sidebar.as_mut().map(|part| part as &mut dyn SidebarControl)
    }

    fn comment_form(&mut self) -> Option<&mut dyn CommentFormControl> {
        self.form.as_mut().map(|part| part as &mut dyn CommentFormControl)
    }

    fn comment_list(&mut self) -> Option<&mut dyn CommentListControl> {
        self.list.as_mut().map(|part| part as &mut dyn CommentListControl)
    }

    fn alert(&mut self, message: &str) {
        self.log.lock().push(Call::Alert(message.to_string()));
    }
}

struct RecordingEmpty(Log);

impl EmptyView for RecordingEmpty {
    fn show_error(&mut self, description: &str) {
        self.0.lock().push(Call::EmptyError(description.to_string()));
    }
}

impl ViewFactory for Recorder {
    type Detail = RecordingView;
    type Empty = RecordingEmpty;

    fn detail_view(&mut self, params: DetailViewParams<'_>) -> RecordingView {
        self.log.lock().push(Call::DetailBuilt {
            post: params.post.id,
            edit_mode: params.edit_mode,
            prev: params.prev_post_id,
            next: params.next_post_id,
            can_edit_posts: params.can_edit_posts,
            can_list_comments: params.can_list_comments,
            can_create_comments: params.can_create_comments,
        });
        let part = |present: bool| present.then(|| Part(self.log.clone()));
        RecordingView {
            log: self.log.clone(),
            sidebar: part(self.sidebar),
            form: part(self.form && params.can_create_comments),
            list: part(self.list && params.can_list_comments),
        }
    }

    fn empty_view(&mut self) -> RecordingEmpty {
        self.log.lock().push(Call::EmptyBuilt);
        RecordingEmpty(self.log.clone())
    }
}

fn post_42() -> Post {
    Post {
        id: 42,
        version: 1,
        score: 5,
        favorite_count: 2,
        ..Post::default()
    }
}

fn with_comment(mut post: Post, id: CommentId, text: &str) -> Post {
    post.comments.push(Comment {
        id: Some(id),
        version: 1,
        post_id: post.id,
        text: text.to_string(),
        ..Comment::default()
    });
    post.comment_count += 1;
    post
}

struct Fixture {
    posts: Arc<MockPostService>,
    comments: Arc<MockCommentService>,
    interactions: Arc<MockInteractionService>,
    navigation: TopNavigation,
    settings: settings::Handle,
    privileges: Arc<dyn PrivilegeCheck>,
}

impl Fixture {
    fn new(post: Post) -> Self {
        let siblings = SiblingPair {
            prev: Some(post.id - 1),
            next: Some(post.id + 1),
        };
        Self {
            posts: Arc::new(MockPostService::with_post(post.clone(), siblings)),
            comments: Arc::new(MockCommentService::new()),
            interactions: Arc::new(MockInteractionService::new([post])),
            navigation: TopNavigation::new(),
            settings: settings::Handle::default(),
            privileges: Arc::new(AllowAll),
        }
    }

    fn services(&self) -> Services {
        Services {
            posts: self.posts.clone(),
            comments: self.comments.clone(),
            interactions: self.interactions.clone(),
            privileges: self.privileges.clone(),
            settings: self.settings.clone(),
            navigation: self.navigation.clone(),
        }
    }

    fn open(&self, id: PostId, views: &Recorder) -> Controller<Recorder> {
        let mut controller = Controller::new(id, false, self.services(), views.clone());
        settle(&mut controller);
        controller
    }
}

fn settle<F: ViewFactory>(controller: &mut Controller<F>) {
    for _ in 0..100 {
        if !controller.is_busy() {
            return;
        }
        controller.wait(Duration::from_millis(50));
    }
    panic!("controller did not settle");
}

fn submit(text: &str) -> ViewEvent {
    CommentFormEvent::Submit {
        text: text.to_string(),
    }
    .into()
}

#[test]
fn builds_detail_view_with_siblings_and_capabilities() {
    let fixture = Fixture::new(post_42());
    let views = Recorder::new();
    let controller = fixture.open(42, &views);

    assert_eq!(controller.phase(), Phase::Ready);
    assert_eq!(
        views.calls()[0],
        Call::DetailBuilt {
            post: 42,
            edit_mode: false,
            prev: Some(41),
            next: Some(43),
            can_edit_posts: true,
            can_list_comments: true,
            can_create_comments: true,
        }
    );
    assert!(fixture.navigation.is_active("posts"));
    let subs = controller.subscriptions();
    assert!(subs.sidebar && subs.comment_form && subs.comment_list);
}

#[test]
fn missing_neighbours_are_passed_as_none() {
    let mut fixture = Fixture::new(post_42());
    fixture.posts = Arc::new(MockPostService::with_post(post_42(), SiblingPair::default()));
    let views = Recorder::new();
    let controller = fixture.open(42, &views);

    assert_eq!(controller.siblings(), Some(SiblingPair::default()));
    assert!(matches!(
        views.calls()[0],
        Call::DetailBuilt {
            prev: None,
            next: None,
            ..
        }
    ));
}

#[test]
fn capabilities_follow_privilege_table() {
    let mut fixture = Fixture::new(post_42());
    let table = [
        ("posts:edit:tags", Rank::Power),
        ("comments:list", Rank::Anonymous),
        ("comments:create", Rank::Regular),
    ]
    .into_iter()
    .map(|(name, rank)| (name.to_string(), rank))
    .collect();
    fixture.privileges = Arc::new(Privileges::new(table, Rank::Regular));
    let views = Recorder::new();
    fixture.open(42, &views);

    assert!(matches!(
        views.calls()[0],
        Call::DetailBuilt {
            can_edit_posts: false,
            can_list_comments: true,
            can_create_comments: true,
            ..
        }
    ));
}

#[test]
fn load_failure_shows_empty_view_only() {
    let mut fixture = Fixture::new(post_42());
    fixture.posts = Arc::new(MockPostService::default());
    let views = Recorder::new();
    let mut controller = fixture.open(42, &views);

    assert_eq!(controller.phase(), Phase::Failed);
    assert_eq!(controller.load_error(), Some("Post 42 not found."));
    assert_eq!(
        views.calls(),
        vec![
            Call::EmptyBuilt,
            Call::EmptyError("Post 42 not found.".to_string())
        ]
    );

    let event = SidebarEvent::Score { post: 42, score: 1 }.into();
    controller.handle_event(event).unwrap();
    settle(&mut controller);
    assert!(fixture.interactions.calls().is_empty());
}

#[test]
fn neighbour_failure_also_fails_the_load() {
    let mut fixture = Fixture::new(post_42());
    fixture.posts = Arc::new(
        MockPostService::with_post(post_42(), SiblingPair::default())
            .fail_around("search is unavailable"),
    );
    let views = Recorder::new();
    let controller = fixture.open(42, &views);

    assert_eq!(controller.phase(), Phase::Failed);
    assert!(controller.post().is_none());
    assert_eq!(
        views.calls(),
        vec![
            Call::EmptyBuilt,
            Call::EmptyError("search is unavailable".to_string())
        ]
    );
}

#[test]
fn neighbour_query_hides_disabled_ratings() {
    let fixture = Fixture::new(post_42());
    fixture.open(42, &Recorder::new());
    assert_eq!(fixture.posts.queries(), vec!["-rating:unsafe".to_string()]);

    let fixture = Fixture::new(post_42());
    let prefs: SafetyPreferences = [("safe", true), ("sketchy", false), ("unsafe", false)]
        .into_iter()
        .collect();
    fixture.settings.update(|settings| settings.list_posts = prefs.clone());
    fixture.open(42, &Recorder::new());
    assert_eq!(
        fixture.posts.queries(),
        vec![query::decorate("", &prefs)]
    );
    assert_eq!(fixture.posts.queries()[0], "-rating:sketchy,unsafe");
}

#[test]
fn settings_are_read_when_the_controller_starts() {
    let fixture = Fixture::new(post_42());
    fixture.settings.update(|settings| {
        *settings = Settings {
            list_posts: SafetyPreferences::empty(),
        }
    });
    fixture.open(42, &Recorder::new());
    assert_eq!(fixture.posts.queries(), vec![String::new()]);
}

#[test]
fn created_comment_is_appended_and_form_cleared() {
    let fixture = Fixture::new(post_42());
    let views = Recorder::new();
    let mut controller = fixture.open(42, &views);

    controller
        .handle_event(
            CommentFormEvent::Change {
                text: "hello".into(),
            }
            .into(),
        )
        .unwrap();
    assert!(controller.exit_confirmation_required());

    controller.handle_event(submit("hello")).unwrap();
    settle(&mut controller);

    let post = controller.post().unwrap();
    assert_eq!(post.comments.len(), 1);
    assert_eq!(post.comments[0].text, "hello");
    assert_eq!(post.comments[0].id, Some(1000));
    assert_eq!(post.comment_count, 1);
    assert!(!controller.exit_confirmation_required());
    assert_eq!(
        views.calls()[1..].to_vec(),
        vec![
            Call::FormEnabled(false),
            Call::FormEnabled(true),
            Call::FormText(String::new()),
            Call::ListChanged(vec![1000]),
        ]
    );
    assert_eq!(fixture.comments.calls(), vec!["create:42".to_string()]);
}

#[test]
fn failed_comment_keeps_text_and_shows_inline_error() {
    let mut fixture = Fixture::new(post_42());
    fixture.comments = Arc::new(MockCommentService::failing("server unreachable"));
    let views = Recorder::new();
    let mut controller = fixture.open(42, &views);

    controller
        .handle_event(
            CommentFormEvent::Change {
                text: "hello".into(),
            }
            .into(),
        )
        .unwrap();
    controller.handle_event(submit("hello")).unwrap();
    settle(&mut controller);

    let calls = views.calls();
    assert!(calls.contains(&Call::FormError("server unreachable".into())));
    assert!(!calls.iter().any(|call| matches!(call, Call::FormText(_))));
    assert!(views.alerts().is_empty());
    assert!(controller.post().unwrap().comments.is_empty());
    assert!(controller.exit_confirmation_required());
}

#[test]
fn submit_while_pending_is_ignored() {
    let mut fixture = Fixture::new(post_42());
    fixture.comments =
        Arc::new(MockCommentService::new().with_latency(Duration::from_millis(150)));
    let views = Recorder::new();
    let mut controller = fixture.open(42, &views);

    controller.handle_event(submit("first")).unwrap();
    controller.handle_event(submit("second")).unwrap();
    assert_eq!(controller.in_flight(), 1);
    settle(&mut controller);

    assert_eq!(fixture.comments.calls(), vec!["create:42".to_string()]);
    let texts: Vec<_> = controller
        .post()
        .unwrap()
        .comments
        .iter()
        .map(|c| c.text.clone())
        .collect();
    assert_eq!(texts, vec!["first".to_string()]);
}

#[test]
fn post_score_failure_alerts_once_and_keeps_score() {
    let mut fixture = Fixture::new(post_42());
    fixture.interactions =
        Arc::new(MockInteractionService::new([post_42()]).failing("rate limited"));
    let views = Recorder::new();
    let mut controller = fixture.open(42, &views);

    controller
        .handle_event(SidebarEvent::Score { post: 42, score: 1 }.into())
        .unwrap();
    settle(&mut controller);

    assert_eq!(views.alerts(), vec!["rate limited".to_string()]);
    let post = controller.post().unwrap();
    assert_eq!(post.score, 5);
    assert_eq!(post.own_score, 0);
    assert!(!views
        .calls()
        .iter()
        .any(|call| matches!(call, Call::SidebarChanged { .. })));
}

#[test]
fn overlapping_score_and_favorite_both_apply() {
    let mut fixture = Fixture::new(post_42());
    fixture.interactions = Arc::new(
        MockInteractionService::new([post_42()]).with_latency("score", Duration::from_millis(150)),
    );
    let views = Recorder::new();
    let mut controller = fixture.open(42, &views);

    controller
        .handle_event(SidebarEvent::Score { post: 42, score: 1 }.into())
        .unwrap();
    controller
        .handle_event(SidebarEvent::Favorite { post: 42 }.into())
        .unwrap();
    assert_eq!(controller.in_flight(), 2);
    settle(&mut controller);

    let post = controller.post().unwrap();
    assert_eq!(post.score, 6);
    assert_eq!(post.own_score, 1);
    assert_eq!(post.favorite_count, 3);
    assert!(post.own_favorite);

    let sidebar: Vec<_> = views
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::SidebarChanged { .. }))
        .collect();
    assert_eq!(
        sidebar,
        vec![
            Call::SidebarChanged {
                score: 5,
                own_score: 0,
                favorite_count: 3,
                own_favorite: true,
            },
            Call::SidebarChanged {
                score: 6,
                own_score: 1,
                favorite_count: 3,
                own_favorite: true,
            },
        ]
    );
    assert!(views.alerts().is_empty());
}

#[test]
fn unfavorite_applies_server_state() {
    let mut post = post_42();
    post.own_favorite = true;
    let fixture = Fixture::new(post);
    let mut controller = fixture.open(42, &Recorder::new());

    controller
        .handle_event(SidebarEvent::Unfavorite { post: 42 }.into())
        .unwrap();
    settle(&mut controller);

    let post = controller.post().unwrap();
    assert!(!post.own_favorite);
    assert_eq!(post.favorite_count, 1);
    assert_eq!(fixture.interactions.calls(), vec!["unfavorite:42".to_string()]);
}

#[test]
fn edited_comment_is_replaced_by_server_copy() {
    let fixture = Fixture::new(with_comment(post_42(), 5, "old"));
    let views = Recorder::new();
    let mut controller = fixture.open(42, &views);

    controller
        .handle_event(
            CommentListEvent::Change {
                comment: 5,
                text: "new".into(),
            }
            .into(),
        )
        .unwrap();
    settle(&mut controller);

    let comment = controller.post().unwrap().comment(5).unwrap();
    assert_eq!(comment.text, "new");
    assert_eq!(comment.version, 2);
    assert_eq!(
        views.calls()[1..].to_vec(),
        vec![
            Call::RowEnabled(5, false),
            Call::RowEnabled(5, true),
            Call::ListChanged(vec![5]),
        ]
    );
}

#[test]
fn failed_edit_reports_on_its_row() {
    let mut fixture = Fixture::new(with_comment(post_42(), 5, "old"));
    fixture.comments = Arc::new(MockCommentService::failing("Someone else modified this."));
    let views = Recorder::new();
    let mut controller = fixture.open(42, &views);

    controller
        .handle_event(
            CommentListEvent::Change {
                comment: 5,
                text: "new".into(),
            }
            .into(),
        )
        .unwrap();
    settle(&mut controller);

    assert!(views
        .calls()
        .contains(&Call::RowError(5, "Someone else modified this.".into())));
    assert!(views.alerts().is_empty());
    assert_eq!(controller.post().unwrap().comment(5).unwrap().version, 1);
}

#[test]
fn deleted_comment_leaves_the_collection() {
    let fixture = Fixture::new(with_comment(post_42(), 5, "bye"));
    let views = Recorder::new();
    let mut controller = fixture.open(42, &views);

    controller
        .handle_event(CommentListEvent::Delete { comment: 5 }.into())
        .unwrap();
    settle(&mut controller);

    let post = controller.post().unwrap();
    assert!(post.comments.is_empty());
    assert_eq!(post.comment_count, 0);
    assert_eq!(views.calls().last(), Some(&Call::ListChanged(Vec::new())));
}

#[test]
fn comment_score_failure_alerts() {
    let mut fixture = Fixture::new(with_comment(post_42(), 5, "meh"));
    fixture.comments = Arc::new(MockCommentService::failing("You are voting too fast."));
    let views = Recorder::new();
    let mut controller = fixture.open(42, &views);

    controller
        .handle_event(
            CommentListEvent::Score {
                comment: 5,
                score: -1,
            }
            .into(),
        )
        .unwrap();
    settle(&mut controller);

    assert_eq!(views.alerts(), vec!["You are voting too fast.".to_string()]);
    assert_eq!(controller.post().unwrap().comment(5).unwrap().own_score, 0);
}

#[test]
fn comment_score_applies_server_copy() {
    let fixture = Fixture::new(with_comment(post_42(), 5, "good"));
    let mut controller = fixture.open(42, &Recorder::new());

    controller
        .handle_event(CommentListEvent::Score { comment: 5, score: 1 }.into())
        .unwrap();
    settle(&mut controller);

    let comment = controller.post().unwrap().comment(5).unwrap();
    assert_eq!(comment.own_score, 1);
    assert_eq!(comment.score, 1);
    assert_eq!(fixture.comments.calls(), vec!["score:5:1".to_string()]);
}

#[test]
fn events_naming_foreign_objects_are_errors() {
    let fixture = Fixture::new(with_comment(post_42(), 5, "hi"));
    let mut controller = fixture.open(42, &Recorder::new());

    assert!(controller
        .handle_event(CommentListEvent::Delete { comment: 999 }.into())
        .is_err());
    assert!(controller
        .handle_event(SidebarEvent::Score { post: 7, score: 1 }.into())
        .is_err());
    assert_eq!(controller.in_flight(), 0);
    assert!(fixture.comments.calls().is_empty());
    assert!(fixture.interactions.calls().is_empty());
}

#[test]
fn events_from_absent_controls_are_dropped() {
    let fixture = Fixture::new(post_42());
    let views = Recorder::without_form();
    let mut controller = fixture.open(42, &views);

    assert!(!controller.subscriptions().comment_form);
    controller.handle_event(submit("hello")).unwrap();
    settle(&mut controller);
    assert!(fixture.comments.calls().is_empty());
}

struct SlowPosts {
    inner: MockPostService,
    delay: Duration,
}

impl PostService for SlowPosts {
    fn load_post(&self, id: PostId) -> Result<Post> {
        thread::sleep(self.delay);
        self.inner.load_post(id)
    }

    fn load_around(&self, id: PostId, query: &str) -> Result<SiblingPair> {
        self.inner.load_around(id, query)
    }
}

#[test]
fn events_before_the_view_exists_are_ignored() {
    let fixture = Fixture::new(post_42());
    let mut services = fixture.services();
    services.posts = Arc::new(SlowPosts {
        inner: MockPostService::with_post(post_42(), SiblingPair::default()),
        delay: Duration::from_millis(200),
    });
    let mut controller = Controller::new(42, false, services, Recorder::new());

    assert_eq!(controller.phase(), Phase::Loading);
    controller
        .handle_event(SidebarEvent::Favorite { post: 42 }.into())
        .unwrap();
    settle(&mut controller);

    assert_eq!(controller.phase(), Phase::Ready);
    assert!(fixture.interactions.calls().is_empty());
}

#[test]
fn router_replaces_the_active_controller() {
    let fixture = Fixture::new(post_42());
    fixture
        .posts
        .insert(Post { id: 43, ..post_42() }, SiblingPair::default());
    let views = Recorder::new();
    let mut router = Router::new(fixture.services(), views.clone());

    settle(router.enter(Route::post(42)));
    let controller = router.enter(Route::parse("/post/43/edit").unwrap());
    settle(controller);

    assert_eq!(
        router.route(),
        Some(Route::Post {
            id: 43,
            edit_mode: true
        })
    );
    let controller = router.controller().unwrap();
    assert_eq!(controller.post_id(), 43);
    assert!(controller.edit_mode());
    assert!(matches!(
        views.calls().last(),
        Some(Call::DetailBuilt {
            post: 43,
            edit_mode: true,
            ..
        })
    ));
}

fn assert_no_inline_errors(views: &Recorder) {
    assert!(!views
        .calls()
        .iter()
        .any(|call| matches!(call, Call::FormError(_) | Call::RowError(..))));
}

#[test]
fn failed_delete_alerts_and_keeps_comment() {
    let mut fixture = Fixture::new(with_comment(post_42(), 5, "stay"));
    fixture.comments = Arc::new(MockCommentService::failing("Insufficient privileges."));
    let views = Recorder::new();
    let mut controller = fixture.open(42, &views);

    controller
        .handle_event(CommentListEvent::Delete { comment: 5 }.into())
        .unwrap();
    settle(&mut controller);

    assert_eq!(views.alerts(), vec!["Insufficient privileges.".to_string()]);
    assert_no_inline_errors(&views);
    let post = controller.post().unwrap();
    assert_eq!(post.comment(5).map(|comment| comment.text.as_str()), Some("stay"));
    assert_eq!(post.comment_count, 1);
}

#[test]
fn failed_favorite_alerts_and_keeps_state() {
    let mut fixture = Fixture::new(post_42());
    fixture.interactions =
        Arc::new(MockInteractionService::new([post_42()]).failing("Favorites are disabled."));
    let views = Recorder::new();
    let mut controller = fixture.open(42, &views);

    controller
        .handle_event(SidebarEvent::Favorite { post: 42 }.into())
        .unwrap();
    settle(&mut controller);

    assert_eq!(views.alerts(), vec!["Favorites are disabled.".to_string()]);
    assert_no_inline_errors(&views);
    let post = controller.post().unwrap();
    assert!(!post.own_favorite);
    assert_eq!(post.favorite_count, 2);
}

#[test]
fn failed_unfavorite_alerts_and_keeps_state() {
    let mut post = post_42();
    post.own_favorite = true;
    let mut fixture = Fixture::new(post.clone());
    fixture.interactions =
        Arc::new(MockInteractionService::new([post]).failing("server unreachable"));
    let views = Recorder::new();
    let mut controller = fixture.open(42, &views);

    controller
        .handle_event(SidebarEvent::Unfavorite { post: 42 }.into())
        .unwrap();
    settle(&mut controller);

    assert_eq!(views.alerts(), vec!["server unreachable".to_string()]);
    assert_no_inline_errors(&views);
    let post = controller.post().unwrap();
    assert!(post.own_favorite);
    assert_eq!(post.favorite_count, 2);
}

/// Scores are committed at once but answered late. Favorites wait a little
/// before committing and answer straight away.
struct LateScoreReplies {
    inner: MockInteractionService,
}

impl InteractionService for LateScoreReplies {
    fn set_score(&self, post: PostId, score: i32) -> Result<Post> {
        let reply = self.inner.set_score(post, score);
        thread::sleep(Duration::from_millis(200));
        reply
    }

    fn add_to_favorites(&self, post: PostId) -> Result<Post> {
        thread::sleep(Duration::from_millis(50));
        self.inner.add_to_favorites(post)
    }

    fn remove_from_favorites(&self, post: PostId) -> Result<Post> {
        self.inner.remove_from_favorites(post)
    }
}

#[test]
fn late_score_reply_keeps_newer_favorite() {
    let fixture = Fixture::new(post_42());
    let mut services = fixture.services();
    services.interactions = Arc::new(LateScoreReplies {
        inner: MockInteractionService::new([post_42()]),
    });
    let views = Recorder::new();
    let mut controller = Controller::new(42, false, services, views.clone());
    settle(&mut controller);

    controller
        .handle_event(SidebarEvent::Score { post: 42, score: 1 }.into())
        .unwrap();
    controller
        .handle_event(SidebarEvent::Favorite { post: 42 }.into())
        .unwrap();
    settle(&mut controller);

    let post = controller.post().unwrap();
    assert_eq!(post.score, 6);
    assert_eq!(post.own_score, 1);
    assert!(post.own_favorite);
    assert_eq!(post.favorite_count, 3);
    assert_eq!(
        views
            .calls()
            .into_iter()
            .rev()
            .find(|call| matches!(call, Call::SidebarChanged { .. })),
        Some(Call::SidebarChanged {
            score: 6,
            own_score: 1,
            favorite_count: 3,
            own_favorite: true,
        })
    );
}

/// Holds one comment. Scores are committed at once and answered late; edits
/// wait a little before committing and answer straight away.
struct OneCommentServer {
    stored: Mutex<Comment>,
}

impl CommentService for OneCommentServer {
    fn create(&self, _draft: &Comment) -> Result<Comment> {
        bail!("Comments are closed.")
    }

    fn update(&self, comment: &Comment) -> Result<Comment> {
        thread::sleep(Duration::from_millis(50));
        let mut stored = self.stored.lock();
        stored.text = comment.text.clone();
        stored.version += 1;
        Ok(stored.clone())
    }

    fn delete(&self, _comment: &Comment) -> Result<()> {
        bail!("Comments are closed.")
    }

    fn set_score(&self, _comment: &Comment, score: i32) -> Result<Comment> {
        let reply = {
            let mut stored = self.stored.lock();
            let delta = i64::from(score - stored.own_score);
            stored.score += delta;
            stored.own_score = score;
            stored.clone()
        };
        thread::sleep(Duration::from_millis(200));
        Ok(reply)
    }
}

#[test]
fn late_comment_score_keeps_edited_text() {
    let post = with_comment(post_42(), 5, "old");
    let fixture = Fixture::new(post.clone());
    let mut services = fixture.services();
    services.comments = Arc::new(OneCommentServer {
        stored: Mutex::new(post.comments[0].clone()),
    });
    let mut controller = Controller::new(42, false, services, Recorder::new());
    settle(&mut controller);

    controller
        .handle_event(
            CommentListEvent::Change {
                comment: 5,
                text: "new".into(),
            }
            .into(),
        )
        .unwrap();
    controller
        .handle_event(CommentListEvent::Score { comment: 5, score: 1 }.into())
        .unwrap();
    settle(&mut controller);

    let comment = controller.post().unwrap().comment(5).unwrap();
    assert_eq!(comment.text, "new");
    assert_eq!(comment.version, 2);
    assert_eq!(comment.score, 1);
    assert_eq!(comment.own_score, 1);
}
