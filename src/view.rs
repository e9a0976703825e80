//! Contracts between the post detail controller and whatever renders it.
//!
//! Views are passive: they report user input as [`ViewEvent`]s and expose a
//! few imperative affordances the controller calls back into. Sub-surfaces
//! are optional; a view without a comment form simply returns `None`.

use crate::models::{CommentId, Post, PostId};
use crate::privileges::Capabilities;

#[derive(Debug, Clone, Copy)]
pub struct DetailViewParams<'a> {
    pub post: &'a Post,
    pub edit_mode: bool,
    pub next_post_id: Option<PostId>,
    pub prev_post_id: Option<PostId>,
    pub can_edit_posts: bool,
    pub can_list_comments: bool,
    pub can_create_comments: bool,
}

impl<'a> DetailViewParams<'a> {
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            can_edit_posts: self.can_edit_posts,
            can_list_comments: self.can_list_comments,
            can_create_comments: self.can_create_comments,
        }
    }
}

pub trait ViewFactory {
    type Detail: DetailView;
    type Empty: EmptyView;

    fn detail_view(&mut self, params: DetailViewParams<'_>) -> Self::Detail;
    fn empty_view(&mut self) -> Self::Empty;
}

/// Error-only surface shown when the post could not be loaded.
pub trait EmptyView {
    fn show_error(&mut self, description: &str);
}

pub trait SidebarControl {
    fn post_changed(&mut self, post: &Post);
}

pub trait CommentFormControl {
    fn set_text(&mut self, text: &str);
    fn show_error(&mut self, description: &str);
    fn set_enabled(&mut self, enabled: bool);
}

pub trait CommentListControl {
    fn comments_changed(&mut self, post: &Post);
    fn show_error(&mut self, comment: CommentId, description: &str);
    fn set_row_enabled(&mut self, comment: CommentId, enabled: bool);
}

pub trait DetailView {
    fn sidebar(&mut self) -> Option<&mut dyn SidebarControl>;
    fn comment_form(&mut self) -> Option<&mut dyn CommentFormControl>;
    fn comment_list(&mut self) -> Option<&mut dyn CommentListControl>;
    /// Blocking, user-visible alert.
    fn alert(&mut self, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidebarEvent {
    Favorite { post: PostId },
    Unfavorite { post: PostId },
    Score { post: PostId, score: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentFormEvent {
    Change { text: String },
    Submit { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentListEvent {
    Change { comment: CommentId, text: String },
    Score { comment: CommentId, score: i32 },
    Delete { comment: CommentId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Sidebar(SidebarEvent),
    CommentForm(CommentFormEvent),
    CommentList(CommentListEvent),
}

impl ViewEvent {
    pub fn source(&self) -> Source {
        match self {
            ViewEvent::Sidebar(_) => Source::Sidebar,
            ViewEvent::CommentForm(_) => Source::CommentForm,
            ViewEvent::CommentList(_) => Source::CommentList,
        }
    }
}

impl From<SidebarEvent> for ViewEvent {
    fn from(event: SidebarEvent) -> Self {
        ViewEvent::Sidebar(event)
    }
}

impl From<CommentFormEvent> for ViewEvent {
    fn from(event: CommentFormEvent) -> Self {
        ViewEvent::CommentForm(event)
    }
}

impl From<CommentListEvent> for ViewEvent {
    fn from(event: CommentListEvent) -> Self {
        ViewEvent::CommentList(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Sidebar,
    CommentForm,
    CommentList,
}

/// Which sub-surfaces the controller listens to. Fixed when the detail view
/// is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Subscriptions {
    pub sidebar: bool,
    pub comment_form: bool,
    pub comment_list: bool,
}

impl Subscriptions {
    pub fn wire<V: DetailView + ?Sized>(view: &mut V) -> Self {
        Self {
            sidebar: view.sidebar().is_some(),
            comment_form: view.comment_form().is_some(),
            comment_list: view.comment_list().is_some(),
        }
    }

    pub fn accepts(&self, source: Source) -> bool {
        match source {
            Source::Sidebar => self.sidebar,
            Source::CommentForm => self.comment_form,
            Source::CommentList => self.comment_list,
        }
    }
}
