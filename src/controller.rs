//! Post detail controller.
//!
//! A controller is built per route activation. It fetches the post and its
//! neighbours concurrently, builds the detail view once both are in, and
//! from then on turns view events into remote mutations. Remote calls run on
//! worker threads; their results come back over a channel and are applied
//! on the thread that owns the controller, one at a time, in whatever order
//! they finish.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::data::{CommentService, InteractionService, PostService};
use crate::models::{Comment, CommentId, Post, PostId, SiblingPair};
use crate::navigation::TopNavigation;
use crate::privileges::{Capabilities, PrivilegeCheck};
use crate::query;
use crate::settings;
use crate::view::{
    CommentFormEvent, CommentListEvent, DetailView, DetailViewParams, EmptyView, SidebarEvent,
    Subscriptions, ViewEvent, ViewFactory,
};

/// Top navigation section the detail view belongs to.
pub const SECTION: &str = "posts";

#[derive(Clone)]
pub struct Services {
    pub posts: Arc<dyn PostService>,
    pub comments: Arc<dyn CommentService>,
    pub interactions: Arc<dyn InteractionService>,
    pub privileges: Arc<dyn PrivilegeCheck>,
    pub settings: settings::Handle,
    pub navigation: TopNavigation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateComment,
    UpdateComment(CommentId),
    ScoreComment(CommentId),
    DeleteComment(CommentId),
    ScorePost,
    FavoritePost,
    UnfavoritePost,
}

/// Where a failed action's description is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    CommentForm,
    CommentRow(CommentId),
    Alert,
}

impl Action {
    /// Text the user typed stays editable next to its error; one-shot
    /// actions get a blocking alert.
    pub fn error_policy(self) -> ErrorPolicy {
        match self {
            Action::CreateComment => ErrorPolicy::CommentForm,
            Action::UpdateComment(id) => ErrorPolicy::CommentRow(id),
            Action::ScoreComment(_)
            | Action::DeleteComment(_)
            | Action::ScorePost
            | Action::FavoritePost
            | Action::UnfavoritePost => ErrorPolicy::Alert,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Action::CreateComment => "create comment",
            Action::UpdateComment(_) => "update comment",
            Action::ScoreComment(_) => "score comment",
            Action::DeleteComment(_) => "delete comment",
            Action::ScorePost => "score post",
            Action::FavoritePost => "favorite post",
            Action::UnfavoritePost => "unfavorite post",
        }
    }
}

enum Outcome {
    CommentCreated(Comment),
    CommentSaved(Comment),
    CommentScored(Comment),
    CommentDeleted(CommentId),
    PostUpdated(Post),
}

enum AsyncResponse {
    Post {
        request_id: u64,
        result: Result<Post, String>,
    },
    Around {
        request_id: u64,
        result: Result<SiblingPair, String>,
    },
    Mutation {
        request_id: u64,
        action: Action,
        result: Result<Outcome, String>,
    },
}

struct PendingLoad {
    request_id: u64,
    post: Option<Post>,
    siblings: Option<SiblingPair>,
}

struct Ready<D> {
    post: Post,
    view: D,
    siblings: SiblingPair,
    capabilities: Capabilities,
    subscriptions: Subscriptions,
}

struct Failed<E> {
    view: E,
    description: String,
}

enum State<D, E> {
    Loading(PendingLoad),
    Ready(Ready<D>),
    Failed(Failed<E>),
}

pub struct Controller<F: ViewFactory> {
    post_id: PostId,
    edit_mode: bool,
    services: Services,
    factory: F,
    state: State<F::Detail, F::Empty>,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    next_request_id: u64,
    in_flight: usize,
    form_pending: bool,
    pending_edits: HashSet<CommentId>,
    exit_confirmation: bool,
}

impl<F: ViewFactory> Controller<F> {
    pub fn new(post_id: PostId, edit_mode: bool, services: Services, factory: F) -> Self {
        services.navigation.activate(SECTION);
        let (response_tx, response_rx) = unbounded();
        let mut controller = Self {
            post_id,
            edit_mode,
            services,
            factory,
            state: State::Loading(PendingLoad {
                request_id: 0,
                post: None,
                siblings: None,
            }),
            response_tx,
            response_rx,
            next_request_id: 1,
            in_flight: 0,
            form_pending: false,
            pending_edits: HashSet::new(),
            exit_confirmation: false,
        };
        controller.start_load();
        controller
    }

    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    pub fn edit_mode(&self) -> bool {
        self.edit_mode
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Loading(_) => Phase::Loading,
            State::Ready(_) => Phase::Ready,
            State::Failed(_) => Phase::Failed,
        }
    }

    pub fn post(&self) -> Option<&Post> {
        match &self.state {
            State::Ready(ready) => Some(&ready.post),
            _ => None,
        }
    }

    pub fn siblings(&self) -> Option<SiblingPair> {
        match &self.state {
            State::Ready(ready) => Some(ready.siblings),
            _ => None,
        }
    }

    pub fn capabilities(&self) -> Option<Capabilities> {
        match &self.state {
            State::Ready(ready) => Some(ready.capabilities),
            _ => None,
        }
    }

    pub fn subscriptions(&self) -> Subscriptions {
        match &self.state {
            State::Ready(ready) => ready.subscriptions,
            _ => Subscriptions::default(),
        }
    }

    pub fn detail_view(&self) -> Option<&F::Detail> {
        match &self.state {
            State::Ready(ready) => Some(&ready.view),
            _ => None,
        }
    }

    /// The detail view alongside the post it renders.
    pub fn detail_view_mut(&mut self) -> Option<(&mut F::Detail, &Post)> {
        match &mut self.state {
            State::Ready(ready) => Some((&mut ready.view, &ready.post)),
            _ => None,
        }
    }

    pub fn empty_view(&self) -> Option<&F::Empty> {
        match &self.state {
            State::Failed(failed) => Some(&failed.view),
            _ => None,
        }
    }

    pub fn load_error(&self) -> Option<&str> {
        match &self.state {
            State::Failed(failed) => Some(&failed.description),
            _ => None,
        }
    }

    /// Whether leaving the view should ask before discarding typed input.
    pub fn exit_confirmation_required(&self) -> bool {
        self.exit_confirmation
    }

    /// True while the initial load or any mutation is outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(self.state, State::Loading(_)) || self.in_flight > 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Applies every completion that has arrived. Never blocks.
    pub fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        changed
    }

    /// Blocks for up to `timeout` waiting for the next completion, then
    /// drains whatever else is ready.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        match self.response_rx.recv_timeout(timeout) {
            Ok(message) => {
                self.handle_async_response(message);
                self.poll_async();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Routes a view event to its handler. Events from sub-surfaces the
    /// controller is not subscribed to, or that arrive before the detail view
    /// exists, are dropped. An event naming a post or comment that is not
    /// part of this view is an error.
    pub fn handle_event(&mut self, event: ViewEvent) -> Result<()> {
        let State::Ready(ready) = &self.state else {
            debug!(?event, "view event without a detail view");
            return Ok(());
        };
        if !ready.subscriptions.accepts(event.source()) {
            debug!(?event, "view event from unsubscribed control");
            return Ok(());
        }

        match event {
            ViewEvent::CommentForm(CommentFormEvent::Change { .. }) => {
                self.comment_changed();
                Ok(())
            }
            ViewEvent::CommentForm(CommentFormEvent::Submit { text }) => {
                self.create_comment(text);
                Ok(())
            }
            ViewEvent::CommentList(CommentListEvent::Change { comment, text }) => {
                self.update_comment(comment, text)
            }
            ViewEvent::CommentList(CommentListEvent::Score { comment, score }) => {
                self.score_comment(comment, score)
            }
            ViewEvent::CommentList(CommentListEvent::Delete { comment }) => {
                self.delete_comment(comment)
            }
            ViewEvent::Sidebar(SidebarEvent::Score { post, score }) => {
                self.check_post(post)?;
                let interactions = Arc::clone(&self.services.interactions);
                self.dispatch(Action::ScorePost, move || {
                    interactions.set_score(post, score).map(Outcome::PostUpdated)
                });
                Ok(())
            }
            ViewEvent::Sidebar(SidebarEvent::Favorite { post }) => {
                self.check_post(post)?;
                let interactions = Arc::clone(&self.services.interactions);
                self.dispatch(Action::FavoritePost, move || {
                    interactions.add_to_favorites(post).map(Outcome::PostUpdated)
                });
                Ok(())
            }
            ViewEvent::Sidebar(SidebarEvent::Unfavorite { post }) => {
                self.check_post(post)?;
                let interactions = Arc::clone(&self.services.interactions);
                self.dispatch(Action::UnfavoritePost, move || {
                    interactions
                        .remove_from_favorites(post)
                        .map(Outcome::PostUpdated)
                });
                Ok(())
            }
        }
    }

    fn start_load(&mut self) {
        let request_id = self.take_request_id();
        let settings = self.services.settings.get();
        let query = query::decorate("", &settings.list_posts);
        info!(post_id = self.post_id, %query, "loading post");

        self.state = State::Loading(PendingLoad {
            request_id,
            post: None,
            siblings: None,
        });

        let id = self.post_id;
        let posts = Arc::clone(&self.services.posts);
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = posts.load_post(id).map_err(|err| err.to_string());
            let _ = tx.send(AsyncResponse::Post { request_id, result });
        });

        let posts = Arc::clone(&self.services.posts);
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = posts
                .load_around(id, &query)
                .map_err(|err| err.to_string());
            let _ = tx.send(AsyncResponse::Around { request_id, result });
        });
    }

    fn take_request_id(&mut self) -> u64 {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        request_id
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Post { request_id, result } => {
                self.handle_load_part(request_id, result.map(LoadPart::Post));
            }
            AsyncResponse::Around { request_id, result } => {
                self.handle_load_part(request_id, result.map(LoadPart::Siblings));
            }
            AsyncResponse::Mutation {
                request_id,
                action,
                result,
            } => self.handle_mutation(request_id, action, result),
        }
    }

    fn handle_load_part(&mut self, request_id: u64, part: Result<LoadPart, String>) {
        let State::Loading(pending) = &mut self.state else {
            debug!(request_id, "load response after load settled");
            return;
        };
        if pending.request_id != request_id {
            return;
        }

        let complete = match part {
            Ok(LoadPart::Post(post)) => {
                pending.post = Some(post);
                Ok(pending.siblings.is_some())
            }
            Ok(LoadPart::Siblings(siblings)) => {
                pending.siblings = Some(siblings);
                Ok(pending.post.is_some())
            }
            Err(description) => Err(description),
        };

        match complete {
            Ok(true) => self.finish_load(),
            Ok(false) => {}
            Err(description) => self.fail_load(description),
        }
    }

    fn finish_load(&mut self) {
        let State::Loading(pending) = &mut self.state else {
            return;
        };
        let (Some(post), Some(siblings)) = (pending.post.take(), pending.siblings.take()) else {
            return;
        };

        let capabilities = Capabilities::resolve(self.services.privileges.as_ref());
        let mut view = self.factory.detail_view(DetailViewParams {
            post: &post,
            edit_mode: self.edit_mode,
            next_post_id: siblings.next,
            prev_post_id: siblings.prev,
            can_edit_posts: capabilities.can_edit_posts,
            can_list_comments: capabilities.can_list_comments,
            can_create_comments: capabilities.can_create_comments,
        });
        let subscriptions = Subscriptions::wire(&mut view);
        info!(
            post_id = post.id,
            comments = post.comments.len(),
            ?siblings,
            ?subscriptions,
            "post ready"
        );

        self.state = State::Ready(Ready {
            post,
            view,
            siblings,
            capabilities,
            subscriptions,
        });
    }

    fn fail_load(&mut self, description: String) {
        warn!(post_id = self.post_id, error = %description, "post load failed");
        let mut view = self.factory.empty_view();
        view.show_error(&description);
        self.state = State::Failed(Failed { view, description });
    }

    fn check_post(&self, post: PostId) -> Result<()> {
        if post != self.post_id {
            bail!("post {post} is not the post on display ({})", self.post_id);
        }
        Ok(())
    }

    fn ready_mut(&mut self) -> Option<&mut Ready<F::Detail>> {
        match &mut self.state {
            State::Ready(ready) => Some(ready),
            _ => None,
        }
    }

    fn comment_snapshot(&self, id: CommentId) -> Result<Comment> {
        let State::Ready(ready) = &self.state else {
            bail!("no post on display");
        };
        ready
            .post
            .comment(id)
            .cloned()
            .ok_or_else(|| anyhow!("comment {id} is not part of post {}", ready.post.id))
    }

    fn comment_changed(&mut self) {
        self.exit_confirmation = true;
    }

    fn create_comment(&mut self, text: String) {
        if self.form_pending {
            debug!("comment form busy; submit ignored");
            return;
        }
        let Some(ready) = self.ready_mut() else {
            return;
        };
        let mut draft = Comment::draft(ready.post.id);
        draft.text = text;
        if let Some(form) = ready.view.comment_form() {
            form.set_enabled(false);
        }
        self.form_pending = true;

        let comments = Arc::clone(&self.services.comments);
        self.dispatch(Action::CreateComment, move || {
            comments.create(&draft).map(Outcome::CommentCreated)
        });
    }

    fn update_comment(&mut self, id: CommentId, text: String) -> Result<()> {
        if self.pending_edits.contains(&id) {
            debug!(comment = id, "comment save in progress; change ignored");
            return Ok(());
        }
        let Some(ready) = self.ready_mut() else {
            return Ok(());
        };
        let post_id = ready.post.id;
        let comment = ready
            .post
            .comment_mut(id)
            .ok_or_else(|| anyhow!("comment {id} is not part of post {post_id}"))?;
        comment.text = text;
        let snapshot = comment.clone();
        if let Some(list) = ready.view.comment_list() {
            list.set_row_enabled(id, false);
        }
        self.pending_edits.insert(id);

        let comments = Arc::clone(&self.services.comments);
        self.dispatch(Action::UpdateComment(id), move || {
            comments.update(&snapshot).map(Outcome::CommentSaved)
        });
        Ok(())
    }

    fn score_comment(&mut self, id: CommentId, score: i32) -> Result<()> {
        let comment = self.comment_snapshot(id)?;
        let comments = Arc::clone(&self.services.comments);
        self.dispatch(Action::ScoreComment(id), move || {
            comments.set_score(&comment, score).map(Outcome::CommentScored)
        });
        Ok(())
    }

    fn delete_comment(&mut self, id: CommentId) -> Result<()> {
        let comment = self.comment_snapshot(id)?;
        let comments = Arc::clone(&self.services.comments);
        self.dispatch(Action::DeleteComment(id), move || {
            comments
                .delete(&comment)
                .map(|()| Outcome::CommentDeleted(id))
        });
        Ok(())
    }

    fn dispatch<J>(&mut self, action: Action, job: J)
    where
        J: FnOnce() -> Result<Outcome> + Send + 'static,
    {
        let request_id = self.take_request_id();
        self.in_flight += 1;
        debug!(request_id, action = action.label(), "dispatching");
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = job().map_err(|err| err.to_string());
            let _ = tx.send(AsyncResponse::Mutation {
                request_id,
                action,
                result,
            });
        });
    }

    fn handle_mutation(
        &mut self,
        request_id: u64,
        action: Action,
        result: Result<Outcome, String>,
    ) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.release_guard(action);

        match result {
            Ok(outcome) => {
                info!(request_id, action = action.label(), "action succeeded");
                self.reconcile(action, outcome);
            }
            Err(description) => {
                warn!(request_id, action = action.label(), error = %description, "action failed");
                self.surface(action.error_policy(), &description);
            }
        }
    }

    fn release_guard(&mut self, action: Action) {
        match action {
            Action::CreateComment => {
                self.form_pending = false;
                if let Some(form) = self.ready_mut().and_then(|ready| ready.view.comment_form()) {
                    form.set_enabled(true);
                }
            }
            Action::UpdateComment(id) => {
                self.pending_edits.remove(&id);
                if let Some(list) = self.ready_mut().and_then(|ready| ready.view.comment_list()) {
                    list.set_row_enabled(id, true);
                }
            }
            _ => {}
        }
    }

    fn reconcile(&mut self, action: Action, outcome: Outcome) {
        let clear_exit_confirmation = matches!(outcome, Outcome::CommentCreated(_));
        let Some(Ready { post, view, .. }) = self.ready_mut() else {
            return;
        };

        match outcome {
            Outcome::CommentCreated(comment) => {
                if !post.add_comment(comment) {
                    warn!(action = action.label(), "created comment does not fit this post");
                }
                if let Some(form) = view.comment_form() {
                    form.set_text("");
                }
                if let Some(list) = view.comment_list() {
                    list.comments_changed(post);
                }
            }
            Outcome::CommentSaved(comment) => {
                if !post.replace_comment(comment) {
                    debug!(action = action.label(), "saved comment no longer listed");
                }
                if let Some(list) = view.comment_list() {
                    list.comments_changed(post);
                }
            }
            Outcome::CommentScored(comment) => {
                if !post.apply_comment_score(&comment) {
                    debug!(action = action.label(), "scored comment no longer listed");
                }
                if let Some(list) = view.comment_list() {
                    list.comments_changed(post);
                }
            }
            Outcome::CommentDeleted(id) => {
                post.remove_comment(id);
                if let Some(list) = view.comment_list() {
                    list.comments_changed(post);
                }
            }
            Outcome::PostUpdated(fresh) => {
                // A reply only owns the fields its own action changed.
                match action {
                    Action::ScorePost => post.apply_score(&fresh),
                    _ => post.apply_favorite(&fresh),
                }
                if let Some(sidebar) = view.sidebar() {
                    sidebar.post_changed(post);
                }
            }
        }

        if clear_exit_confirmation {
            self.exit_confirmation = false;
        }
    }

    fn surface(&mut self, policy: ErrorPolicy, description: &str) {
        let Some(ready) = self.ready_mut() else {
            return;
        };
        match policy {
            ErrorPolicy::CommentForm => match ready.view.comment_form() {
                Some(form) => form.show_error(description),
                None => ready.view.alert(description),
            },
            ErrorPolicy::CommentRow(id) => match ready.view.comment_list() {
                Some(list) => list.show_error(id, description),
                None => ready.view.alert(description),
            },
            ErrorPolicy::Alert => ready.view.alert(description),
        }
    }
}

enum LoadPart {
    Post(Post),
    Siblings(SiblingPair),
}
