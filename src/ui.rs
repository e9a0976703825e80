use std::collections::HashMap;
use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use tracing::{debug, info};
use unicode_width::UnicodeWidthStr;

use crate::controller::{Phase, Services};
use crate::markdown;
use crate::models::{CommentId, Post, PostId};
use crate::navigation::TopNavigation;
use crate::routes::{Route, Router};
use crate::view::{
    CommentFormControl, CommentFormEvent, CommentListControl, CommentListEvent, DetailView,
    DetailViewParams, EmptyView, SidebarControl, SidebarEvent, ViewEvent, ViewFactory,
};

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const ICON_SCORE: &str = "▲";
const ICON_FAVORITE: &str = "♥";
const ICON_COMMENTS: &str = "✎";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    bg: Color,
    panel_bg: Color,
    panel_focused_bg: Color,
    panel_selected_bg: Color,
    border_idle: Color,
    border_focused: Color,
    text_primary: Color,
    text_secondary: Color,
    accent: Color,
    success: Color,
    error: Color,
}

const DEFAULT_PALETTE: Palette = Palette {
    bg: Color::Rgb(30, 30, 46),
    panel_bg: Color::Rgb(24, 24, 36),
    panel_focused_bg: Color::Rgb(49, 50, 68),
    panel_selected_bg: Color::Rgb(69, 71, 90),
    border_idle: Color::Rgb(49, 50, 68),
    border_focused: Color::Rgb(137, 180, 250),
    text_primary: Color::Rgb(205, 214, 244),
    text_secondary: Color::Rgb(166, 173, 200),
    accent: Color::Rgb(137, 180, 250),
    success: Color::Rgb(166, 227, 161),
    error: Color::Rgb(243, 139, 168),
};

const LIGHT_PALETTE: Palette = Palette {
    bg: Color::Rgb(239, 241, 245),
    panel_bg: Color::Rgb(230, 233, 239),
    panel_focused_bg: Color::Rgb(204, 208, 218),
    panel_selected_bg: Color::Rgb(188, 192, 204),
    border_idle: Color::Rgb(188, 192, 204),
    border_focused: Color::Rgb(30, 102, 245),
    text_primary: Color::Rgb(76, 79, 105),
    text_secondary: Color::Rgb(108, 111, 133),
    accent: Color::Rgb(30, 102, 245),
    success: Color::Rgb(64, 160, 43),
    error: Color::Rgb(210, 15, 57),
};

impl Palette {
    /// Unknown names fall back to the default dark palette.
    pub fn named(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "light" => LIGHT_PALETTE,
            _ => DEFAULT_PALETTE,
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        DEFAULT_PALETTE
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let percent_y = percent_y.min(100);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage(100 - percent_x - (100 - percent_x) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage(100 - percent_y - (100 - percent_y) / 2),
        ])
        .split(horizontal[1]);
    vertical[1]
}

fn wrap_plain(text: &str, width: usize, prefix: &str, style: Style) -> Vec<Line<'static>> {
    if text.trim().is_empty() {
        return vec![Line::from(Span::styled(prefix.to_string(), style))];
    }
    let width = width.max(prefix.chars().count() + 1);
    let options = WrapOptions::new(width)
        .break_words(false)
        .initial_indent(prefix)
        .subsequent_indent(prefix);
    wrap(text, options)
        .into_iter()
        .map(|cow| Line::from(Span::styled(cow.into_owned(), style)))
        .collect()
}

/// Rendered markdown lines that fit are kept with their styles; overlong
/// ones are rewrapped as plain text in the style of their last span.
fn fit_lines(text: Text<'static>, width: usize, prefix: &str, base: Style) -> Vec<Line<'static>> {
    let mut out = Vec::with_capacity(text.lines.len());
    for line in text.lines {
        let plain: String = line.spans.iter().map(|span| span.content.as_ref()).collect();
        if UnicodeWidthStr::width(plain.as_str()) + prefix.len() <= width {
            let mut spans = Vec::with_capacity(line.spans.len() + 1);
            spans.push(Span::styled(prefix.to_string(), base));
            spans.extend(
                line.spans
                    .into_iter()
                    .map(|span| Span::styled(span.content, base.patch(span.style))),
            );
            out.push(Line::from(spans));
        } else {
            let style = line
                .spans
                .last()
                .map(|span| base.patch(span.style))
                .unwrap_or(base);
            out.extend(wrap_plain(&plain, width, prefix, style));
        }
    }
    out
}

fn toggle_vote_value(old: i32, requested: i32) -> i32 {
    if old == requested {
        0
    } else {
        requested
    }
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

/// What a key press on a screen asks the app to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    Ignored,
    Handled,
    Status(String),
    Event(ViewEvent),
    Navigate(Route),
    Quit,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalViews;

impl ViewFactory for TerminalViews {
    type Detail = PostScreen;
    type Empty = ErrorScreen;

    fn detail_view(&mut self, params: DetailViewParams<'_>) -> PostScreen {
        PostScreen::new(params)
    }

    fn empty_view(&mut self) -> ErrorScreen {
        ErrorScreen::default()
    }
}

#[derive(Debug, Default)]
pub struct ErrorScreen {
    message: Option<String>,
}

impl ErrorScreen {
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    fn draw(&self, frame: &mut Frame<'_>, area: Rect, palette: Palette) {
        let popup = centered_rect(60, 30, area);
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| "Nothing to show.".to_string());
        let body = Paragraph::new(vec![
            Line::from(Span::styled(
                message,
                Style::default().fg(palette.error).add_modifier(Modifier::BOLD),
            )),
            Line::default(),
            Line::from(Span::styled(
                "Press q to quit.",
                Style::default().fg(palette.text_secondary),
            )),
        ])
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title(Span::styled(
                    "Post unavailable",
                    Style::default().fg(palette.error),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.error))
                .style(Style::default().bg(palette.panel_bg))
                .padding(Padding::uniform(1)),
        );
        frame.render_widget(body, popup);
    }
}

impl EmptyView for ErrorScreen {
    fn show_error(&mut self, description: &str) {
        self.message = Some(description.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Summary {
    score: i64,
    favorite_count: i64,
    own_score: i32,
    own_favorite: bool,
    comment_count: i64,
}

impl Summary {
    fn of(post: &Post) -> Self {
        Self {
            score: post.score,
            favorite_count: post.favorite_count,
            own_score: post.own_score,
            own_favorite: post.own_favorite,
            comment_count: post.comment_count,
        }
    }
}

/// Score and favorite controls. Shown when the post is viewed, not edited.
#[derive(Debug)]
pub struct Sidebar {
    summary: Summary,
    updates: usize,
}

impl SidebarControl for Sidebar {
    fn post_changed(&mut self, post: &Post) {
        self.summary = Summary::of(post);
        self.updates += 1;
    }
}

#[derive(Debug, Default)]
pub struct CommentForm {
    text: String,
    error: Option<String>,
    disabled: bool,
}

impl CommentForm {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }
}

impl CommentFormControl for CommentForm {
    fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
        self.error = None;
    }

    fn show_error(&mut self, description: &str) {
        self.error = Some(description.to_string());
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.disabled = !enabled;
    }
}

#[derive(Debug, Default, Clone)]
struct RowState {
    error: Option<String>,
    disabled: bool,
}

#[derive(Debug)]
pub struct CommentList {
    order: Vec<CommentId>,
    rows: HashMap<CommentId, RowState>,
    selected: usize,
}

impl CommentList {
    fn new(post: &Post) -> Self {
        let mut list = Self {
            order: Vec::new(),
            rows: HashMap::new(),
            selected: 0,
        };
        list.comments_changed(post);
        list
    }

    pub fn selected(&self) -> Option<CommentId> {
        self.order.get(self.selected).copied()
    }

    pub fn row_error(&self, comment: CommentId) -> Option<&str> {
        self.rows.get(&comment).and_then(|row| row.error.as_deref())
    }

    pub fn row_enabled(&self, comment: CommentId) -> bool {
        self.rows.get(&comment).map(|row| !row.disabled).unwrap_or(true)
    }

    fn move_selection(&mut self, delta: isize) {
        if self.order.is_empty() {
            self.selected = 0;
            return;
        }
        let last = self.order.len() - 1;
        self.selected = (self.selected as isize + delta).clamp(0, last as isize) as usize;
    }
}

impl CommentListControl for CommentList {
    fn comments_changed(&mut self, post: &Post) {
        let previous = self.selected();
        self.order = post.comments.iter().filter_map(|comment| comment.id).collect();
        self.rows.retain(|id, _| self.order.contains(id));
        self.selected = previous
            .and_then(|id| self.order.iter().position(|other| *other == id))
            .unwrap_or_else(|| self.selected.min(self.order.len().saturating_sub(1)));
    }

    fn show_error(&mut self, comment: CommentId, description: &str) {
        self.rows.entry(comment).or_default().error = Some(description.to_string());
    }

    fn set_row_enabled(&mut self, comment: CommentId, enabled: bool) {
        let row = self.rows.entry(comment).or_default();
        row.disabled = !enabled;
        if !enabled {
            row.error = None;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Focus {
    Comments,
    Form,
    Edit { comment: CommentId, buffer: String },
    ConfirmDelete(CommentId),
}

/// Terminal rendition of the post detail view. Holds only view state; the
/// post itself is passed in by the owner when drawing or handling keys.
#[derive(Debug)]
pub struct PostScreen {
    post_id: PostId,
    edit_mode: bool,
    prev_post_id: Option<PostId>,
    next_post_id: Option<PostId>,
    sidebar: Option<Sidebar>,
    comment_form: Option<CommentForm>,
    comment_list: Option<CommentList>,
    focus: Focus,
    alert: Option<String>,
}

impl PostScreen {
    pub fn new(params: DetailViewParams<'_>) -> Self {
        let capabilities = params.capabilities();
        let editing = params.edit_mode && capabilities.can_edit_posts;
        Self {
            post_id: params.post.id,
            edit_mode: editing,
            prev_post_id: params.prev_post_id,
            next_post_id: params.next_post_id,
            sidebar: (!editing).then(|| Sidebar {
                summary: Summary::of(params.post),
                updates: 0,
            }),
            comment_form: capabilities
                .can_create_comments
                .then(CommentForm::default),
            comment_list: capabilities
                .can_list_comments
                .then(|| CommentList::new(params.post)),
            focus: Focus::Comments,
            alert: None,
        }
    }

    pub fn alert_message(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn form(&self) -> Option<&CommentForm> {
        self.comment_form.as_ref()
    }

    pub fn list(&self) -> Option<&CommentList> {
        self.comment_list.as_ref()
    }

    pub fn is_editing_post(&self) -> bool {
        self.edit_mode
    }

    pub fn sidebar_updates(&self) -> usize {
        self.sidebar.as_ref().map(|sidebar| sidebar.updates).unwrap_or(0)
    }

    pub fn handle_key(&mut self, code: KeyCode, post: &Post) -> KeyOutcome {
        if self.alert.is_some() {
            return match code {
                KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ') => {
                    self.alert = None;
                    KeyOutcome::Handled
                }
                _ => KeyOutcome::Ignored,
            };
        }

        match self.focus.clone() {
            Focus::Form => self.handle_form_key(code),
            Focus::Edit { comment, buffer } => self.handle_edit_key(code, comment, buffer),
            Focus::ConfirmDelete(comment) => {
                self.focus = Focus::Comments;
                match code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => {
                        KeyOutcome::Event(CommentListEvent::Delete { comment }.into())
                    }
                    _ => KeyOutcome::Status("Delete cancelled.".to_string()),
                }
            }
            Focus::Comments => self.handle_browse_key(code, post),
        }
    }

    fn handle_form_key(&mut self, code: KeyCode) -> KeyOutcome {
        let Some(form) = self.comment_form.as_mut() else {
            self.focus = Focus::Comments;
            return KeyOutcome::Ignored;
        };
        match code {
            KeyCode::Esc => {
                self.focus = Focus::Comments;
                KeyOutcome::Handled
            }
            KeyCode::Enter => {
                if form.disabled {
                    return KeyOutcome::Status("Comment is being posted…".to_string());
                }
                if form.text.trim().is_empty() {
                    return KeyOutcome::Status("Type a comment first.".to_string());
                }
                form.error = None;
                KeyOutcome::Event(
                    CommentFormEvent::Submit {
                        text: form.text.clone(),
                    }
                    .into(),
                )
            }
            KeyCode::Backspace => {
                if form.disabled || form.text.pop().is_none() {
                    return KeyOutcome::Handled;
                }
                KeyOutcome::Event(
                    CommentFormEvent::Change {
                        text: form.text.clone(),
                    }
                    .into(),
                )
            }
            KeyCode::Char(ch) if !ch.is_control() => {
                if form.disabled {
                    return KeyOutcome::Handled;
                }
                form.text.push(ch);
                KeyOutcome::Event(
                    CommentFormEvent::Change {
                        text: form.text.clone(),
                    }
                    .into(),
                )
            }
            _ => KeyOutcome::Ignored,
        }
    }

    fn handle_edit_key(&mut self, code: KeyCode, comment: CommentId, mut buffer: String) -> KeyOutcome {
        match code {
            KeyCode::Esc => {
                self.focus = Focus::Comments;
                KeyOutcome::Status("Edit cancelled.".to_string())
            }
            KeyCode::Enter => {
                self.focus = Focus::Comments;
                KeyOutcome::Event(
                    CommentListEvent::Change {
                        comment,
                        text: buffer,
                    }
                    .into(),
                )
            }
            KeyCode::Backspace => {
                buffer.pop();
                self.focus = Focus::Edit { comment, buffer };
                KeyOutcome::Handled
            }
            KeyCode::Char(ch) if !ch.is_control() => {
                buffer.push(ch);
                self.focus = Focus::Edit { comment, buffer };
                KeyOutcome::Handled
            }
            _ => KeyOutcome::Ignored,
        }
    }

    fn handle_browse_key(&mut self, code: KeyCode, post: &Post) -> KeyOutcome {
        match code {
            KeyCode::Char('q') => KeyOutcome::Quit,
            KeyCode::Char('[') => match self.prev_post_id {
                Some(id) => KeyOutcome::Navigate(Route::post(id)),
                None => KeyOutcome::Status("No previous post.".to_string()),
            },
            KeyCode::Char(']') => match self.next_post_id {
                Some(id) => KeyOutcome::Navigate(Route::post(id)),
                None => KeyOutcome::Status("No next post.".to_string()),
            },
            KeyCode::Char('+') | KeyCode::Char('-') | KeyCode::Char('0') => {
                if self.sidebar.is_none() {
                    return KeyOutcome::Ignored;
                }
                let score = match code {
                    KeyCode::Char('+') => 1,
                    KeyCode::Char('-') => -1,
                    _ => 0,
                };
                KeyOutcome::Event(
                    SidebarEvent::Score {
                        post: self.post_id,
                        score,
                    }
                    .into(),
                )
            }
            KeyCode::Char('f') => match &self.sidebar {
                Some(sidebar) if sidebar.summary.own_favorite => {
                    KeyOutcome::Event(SidebarEvent::Unfavorite { post: self.post_id }.into())
                }
                Some(_) => KeyOutcome::Event(SidebarEvent::Favorite { post: self.post_id }.into()),
                None => KeyOutcome::Ignored,
            },
            KeyCode::Char('j') | KeyCode::Down => {
                if let Some(list) = self.comment_list.as_mut() {
                    list.move_selection(1);
                }
                KeyOutcome::Handled
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if let Some(list) = self.comment_list.as_mut() {
                    list.move_selection(-1);
                }
                KeyOutcome::Handled
            }
            KeyCode::Char('u') | KeyCode::Char('d') => {
                let Some(id) = self.selected_comment() else {
                    return KeyOutcome::Ignored;
                };
                let requested = if code == KeyCode::Char('u') { 1 } else { -1 };
                let old = post.comment(id).map(|c| c.own_score).unwrap_or(0);
                KeyOutcome::Event(
                    CommentListEvent::Score {
                        comment: id,
                        score: toggle_vote_value(old, requested),
                    }
                    .into(),
                )
            }
            KeyCode::Char('e') => {
                let Some(id) = self.selected_comment() else {
                    return KeyOutcome::Ignored;
                };
                if !self.row_enabled(id) {
                    return KeyOutcome::Status("Comment is being saved…".to_string());
                }
                let buffer = post.comment(id).map(|c| c.text.clone()).unwrap_or_default();
                self.focus = Focus::Edit {
                    comment: id,
                    buffer,
                };
                KeyOutcome::Handled
            }
            KeyCode::Char('x') => {
                let Some(id) = self.selected_comment() else {
                    return KeyOutcome::Ignored;
                };
                self.focus = Focus::ConfirmDelete(id);
                KeyOutcome::Handled
            }
            KeyCode::Char('c') => {
                if self.comment_form.is_none() {
                    return KeyOutcome::Status("You cannot comment on posts.".to_string());
                }
                self.focus = Focus::Form;
                KeyOutcome::Handled
            }
            _ => KeyOutcome::Ignored,
        }
    }

    fn selected_comment(&self) -> Option<CommentId> {
        self.comment_list.as_ref().and_then(CommentList::selected)
    }

    fn row_enabled(&self, id: CommentId) -> bool {
        self.comment_list
            .as_ref()
            .map(|list| list.row_enabled(id))
            .unwrap_or(true)
    }

    fn footer_text(&self) -> &'static str {
        match self.focus {
            Focus::Form => "type to compose · Enter post · Esc back",
            Focus::Edit { .. } => "editing comment · Enter save · Esc cancel",
            Focus::ConfirmDelete(_) => "delete this comment? y confirm · any other key cancels",
            Focus::Comments if self.edit_mode => "[/] prev/next · j/k select · c comment · q quit",
            Focus::Comments => {
                "[/] prev/next · +/-/0 score · f favorite · j/k select · u/d vote · e edit · x delete · c comment · q quit"
            }
        }
    }

    fn panel_block(&self, title: String, focused: bool, palette: Palette) -> Block<'static> {
        let border_style = if focused {
            Style::default().fg(palette.border_focused)
        } else {
            Style::default().fg(palette.border_idle)
        };
        let title_style = if focused {
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(palette.text_secondary)
        };
        Block::default()
            .title(Span::styled(title, title_style))
            .borders(Borders::ALL)
            .border_style(border_style)
            .style(Style::default().bg(palette.panel_bg))
            .padding(Padding::horizontal(1))
    }

    fn draw(&self, frame: &mut Frame<'_>, area: Rect, post: &Post, palette: Palette) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(68), Constraint::Percentage(32)])
            .split(area);

        let form_height = if self.comment_form.is_some() { 5 } else { 0 };
        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(6),
                Constraint::Min(3),
                Constraint::Length(form_height),
            ])
            .split(columns[0]);

        self.draw_header(frame, left[0], post, palette);
        self.draw_comments(frame, left[1], post, palette);
        if let Some(form) = &self.comment_form {
            self.draw_form(frame, left[2], form, palette);
        }
        self.draw_sidebar(frame, columns[1], post, palette);

        if let Focus::ConfirmDelete(id) = self.focus {
            draw_prompt(
                frame,
                area,
                "Delete comment",
                &format!("Delete comment #{id}? (y/n)"),
                palette.accent,
                palette,
            );
        }
        if let Some(message) = &self.alert {
            draw_prompt(frame, area, "Error", message, palette.error, palette);
        }
    }

    fn draw_header(&self, frame: &mut Frame<'_>, area: Rect, post: &Post, palette: Palette) {
        let title = if self.edit_mode {
            format!("Post #{} [editing]", post.id)
        } else {
            format!("Post #{}", post.id)
        };
        let block = self.panel_block(title, false, palette);
        let primary = Style::default().fg(palette.text_primary);
        let secondary = Style::default().fg(palette.text_secondary);
        let uploader = post
            .user
            .as_ref()
            .map(|user| user.name.as_str())
            .unwrap_or("anonymous");
        let created = post
            .creation_time
            .map(|time| time.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let mut lines = vec![
            Line::from(vec![
                Span::styled(format!("{} · {}", post.kind, post.safety.as_str()), primary),
                Span::styled(format!("  by {uploader} on {created}"), secondary),
            ]),
            Line::from(Span::styled(post.content_url.clone(), secondary)),
        ];
        if let Some(source) = post.source.as_deref().filter(|s| !s.is_empty()) {
            lines.push(Line::from(Span::styled(format!("source: {source}"), secondary)));
        }
        let header = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(header, area);
    }

    fn draw_comments(&self, frame: &mut Frame<'_>, area: Rect, post: &Post, palette: Palette) {
        let focused = self.focus == Focus::Comments
            || matches!(self.focus, Focus::Edit { .. } | Focus::ConfirmDelete(_));
        let title = format!("{ICON_COMMENTS} Comments ({})", post.comment_count);
        let block = self.panel_block(title, focused, palette);
        let inner = block.inner(area);
        let width = inner.width.max(1) as usize;

        let Some(list) = &self.comment_list else {
            let hidden = Paragraph::new(Span::styled(
                "You are not allowed to view comments.",
                Style::default().fg(palette.text_secondary),
            ))
            .block(block);
            frame.render_widget(hidden, area);
            return;
        };
        if list.order.is_empty() {
            let empty = Paragraph::new(Span::styled(
                "No comments yet.",
                Style::default().fg(palette.text_secondary),
            ))
            .block(block);
            frame.render_widget(empty, area);
            return;
        }

        let mut items = Vec::with_capacity(list.order.len());
        for (index, id) in list.order.iter().enumerate() {
            let Some(comment) = post.comment(*id) else {
                continue;
            };
            let row = list.rows.get(id).cloned().unwrap_or_default();
            let selected = index == list.selected;
            let background = if selected && focused {
                palette.panel_selected_bg
            } else {
                palette.panel_bg
            };
            let mut meta_style = Style::default().fg(palette.accent).bg(background);
            if selected {
                meta_style = meta_style.add_modifier(Modifier::BOLD);
            }
            let mut body_style = Style::default().fg(palette.text_primary).bg(background);
            if row.disabled {
                body_style = body_style.add_modifier(Modifier::DIM);
            }

            let vote = match comment.own_score {
                1 => " (+1)",
                -1 => " (-1)",
                _ => "",
            };
            let edited = if comment.last_edit_time.is_some() {
                " · edited"
            } else {
                ""
            };
            let mut lines = vec![Line::from(Span::styled(
                format!(
                    "{} · {ICON_SCORE} {}{vote}{edited}",
                    comment.author(),
                    comment.score
                ),
                meta_style,
            ))];

            match &self.focus {
                Focus::Edit { comment: editing, buffer } if editing == id => {
                    lines.extend(wrap_plain(
                        &format!("{buffer}▏"),
                        width,
                        "  ",
                        Style::default().fg(palette.text_primary).bg(palette.panel_focused_bg),
                    ));
                }
                _ => lines.extend(fit_lines(
                    markdown::render(&comment.text),
                    width,
                    "  ",
                    body_style,
                )),
            }
            if row.disabled {
                lines.push(Line::from(Span::styled(
                    "  saving…",
                    Style::default().fg(palette.text_secondary).bg(background),
                )));
            }
            if let Some(error) = &row.error {
                lines.extend(wrap_plain(
                    error,
                    width,
                    "  ! ",
                    Style::default().fg(palette.error).bg(background),
                ));
            }
            lines.push(Line::default());
            items.push(ListItem::new(lines));
        }

        let mut state = ListState::default();
        state.select(Some(list.selected.min(items.len().saturating_sub(1))));
        frame.render_stateful_widget(List::new(items).block(block), area, &mut state);
    }

    fn draw_form(&self, frame: &mut Frame<'_>, area: Rect, form: &CommentForm, palette: Palette) {
        let focused = self.focus == Focus::Form;
        let title = if form.disabled {
            "New comment (posting…)".to_string()
        } else {
            "New comment".to_string()
        };
        let block = self.panel_block(title, focused, palette);
        let width = block.inner(area).width.max(1) as usize;
        let mut lines = if form.text.is_empty() && !focused {
            vec![Line::from(Span::styled(
                "Press c to write a comment.",
                Style::default().fg(palette.text_secondary),
            ))]
        } else {
            let cursor = if focused { "▏" } else { "" };
            wrap_plain(
                &format!("{}{cursor}", form.text),
                width,
                "",
                Style::default().fg(palette.text_primary),
            )
        };
        if let Some(error) = &form.error {
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(palette.error),
            )));
        }
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn draw_sidebar(&self, frame: &mut Frame<'_>, area: Rect, post: &Post, palette: Palette) {
        let block = self.panel_block("Details".to_string(), false, palette);
        let primary = Style::default().fg(palette.text_primary);
        let secondary = Style::default().fg(palette.text_secondary);
        let mut lines = Vec::new();

        match &self.sidebar {
            Some(sidebar) => {
                let summary = sidebar.summary;
                let score_style = match summary.own_score {
                    1 => Style::default().fg(palette.success),
                    -1 => Style::default().fg(palette.error),
                    _ => primary,
                };
                let fav_style = if summary.own_favorite {
                    Style::default().fg(palette.error)
                } else {
                    primary
                };
                lines.push(Line::from(vec![
                    Span::styled(format!("{ICON_SCORE} {}", summary.score), score_style),
                    Span::raw("   "),
                    Span::styled(format!("{ICON_FAVORITE} {}", summary.favorite_count), fav_style),
                    Span::raw("   "),
                    Span::styled(format!("{ICON_COMMENTS} {}", summary.comment_count), secondary),
                ]));
            }
            None => lines.push(Line::from(Span::styled(
                "Editing: score and favorites are hidden.",
                secondary,
            ))),
        }
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            format!("Safety: {}", post.safety.as_str()),
            primary,
        )));
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            format!("Tags ({})", post.tags.len()),
            Style::default().fg(palette.accent).add_modifier(Modifier::BOLD),
        )));
        for tag in &post.tags {
            lines.push(Line::from(vec![
                Span::styled(tag.primary_name().to_string(), primary),
                Span::styled(format!(" {}", tag.usages), secondary),
            ]));
        }
        lines.push(Line::default());
        let neighbour = |id: Option<PostId>| {
            id.map(|id| format!("#{id}"))
                .unwrap_or_else(|| "none".to_string())
        };
        lines.push(Line::from(Span::styled(
            format!(
                "[ {}   ] {}",
                neighbour(self.prev_post_id),
                neighbour(self.next_post_id)
            ),
            secondary,
        )));

        let sidebar = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(sidebar, area);
    }
}

impl DetailView for PostScreen {
    fn sidebar(&mut self) -> Option<&mut dyn SidebarControl> {
        self.sidebar
            .as_mut()
            .map(|sidebar| sidebar as &mut dyn SidebarControl)
    }

    fn comment_form(&mut self) -> Option<&mut dyn CommentFormControl> {
        self.comment_form
            .as_mut()
            .map(|form| form as &mut dyn CommentFormControl)
    }

    fn comment_list(&mut self) -> Option<&mut dyn CommentListControl> {
        self.comment_list
            .as_mut()
            .map(|list| list as &mut dyn CommentListControl)
    }

    fn alert(&mut self, message: &str) {
        self.alert = Some(message.to_string());
    }
}

fn draw_prompt(
    frame: &mut Frame<'_>,
    area: Rect,
    title: &str,
    message: &str,
    accent: Color,
    palette: Palette,
) {
    let popup = centered_rect(50, 25, area);
    frame.render_widget(Clear, popup);
    let body = Paragraph::new(vec![
        Line::from(Span::styled(
            message.to_string(),
            Style::default().fg(palette.text_primary),
        )),
        Line::default(),
        Line::from(Span::styled(
            "Enter to dismiss",
            Style::default().fg(palette.text_secondary),
        )),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .title(Span::styled(
                title.to_string(),
                Style::default().fg(accent).add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(accent))
            .style(Style::default().bg(palette.panel_bg)),
    );
    frame.render_widget(body, popup);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingExit {
    Quit,
    Navigate(Route),
}

pub struct Options {
    pub services: Services,
    pub route: Route,
    pub theme: String,
    pub status_message: String,
}

pub struct App {
    router: Router<TerminalViews>,
    navigation: TopNavigation,
    palette: Palette,
    status_message: String,
    spinner: Spinner,
    confirm_exit: Option<PendingExit>,
    last_phase: Option<Phase>,
    needs_redraw: bool,
}

impl App {
    pub fn new(options: Options) -> Self {
        let navigation = options.services.navigation.clone();
        let mut router = Router::new(options.services, TerminalViews);
        router.enter(options.route);
        Self {
            router,
            navigation,
            palette: Palette::named(&options.theme),
            status_message: options.status_message,
            spinner: Spinner::new(),
            confirm_exit: None,
            last_phase: None,
            needs_redraw: true,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {}", err);
                            }
                        }
                        self.mark_dirty();
                    }
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.is_loading() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn is_loading(&self) -> bool {
        self.router
            .controller()
            .map(|controller| controller.is_busy())
            .unwrap_or(false)
    }

    fn poll_async(&mut self) -> bool {
        let Some(controller) = self.router.controller_mut() else {
            return false;
        };
        let changed = controller.poll_async();
        let phase = controller.phase();
        if self.last_phase != Some(phase) {
            match phase {
                Phase::Loading => {}
                Phase::Ready => {
                    self.status_message = format!("Post #{} loaded.", controller.post_id());
                }
                Phase::Failed => {
                    self.status_message = format!("Could not load post #{}.", controller.post_id());
                }
            }
            self.last_phase = Some(phase);
            return true;
        }
        changed
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        if let Some(pending) = self.confirm_exit {
            return match code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    self.confirm_exit = None;
                    Ok(self.leave(pending))
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.confirm_exit = None;
                    self.status_message = "Staying on this post.".to_string();
                    Ok(false)
                }
                _ => Ok(false),
            };
        }

        let Some(controller) = self.router.controller_mut() else {
            return Ok(matches!(code, KeyCode::Char('q')));
        };
        let outcome = match controller.detail_view_mut() {
            Some((view, post)) => view.handle_key(code, post),
            None => match code {
                KeyCode::Char('q') | KeyCode::Esc => KeyOutcome::Quit,
                _ => KeyOutcome::Ignored,
            },
        };

        match outcome {
            KeyOutcome::Ignored | KeyOutcome::Handled => Ok(false),
            KeyOutcome::Status(message) => {
                self.status_message = message;
                Ok(false)
            }
            KeyOutcome::Event(event) => {
                debug!(?event, "view event");
                controller.handle_event(event)?;
                Ok(false)
            }
            KeyOutcome::Navigate(route) => Ok(self.request_exit(PendingExit::Navigate(route))),
            KeyOutcome::Quit => Ok(self.request_exit(PendingExit::Quit)),
        }
    }

    fn request_exit(&mut self, pending: PendingExit) -> bool {
        let unsaved = self
            .router
            .controller()
            .map(|controller| controller.exit_confirmation_required())
            .unwrap_or(false);
        if unsaved {
            self.confirm_exit = Some(pending);
            return false;
        }
        self.leave(pending)
    }

    fn leave(&mut self, pending: PendingExit) -> bool {
        match pending {
            PendingExit::Quit => true,
            PendingExit::Navigate(route) => {
                info!(route = %route.path(), "entering route");
                self.status_message = format!("Loading {}…", route.path());
                self.last_phase = None;
                self.router.enter(route);
                false
            }
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let palette = self.palette;
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(palette.bg)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        self.draw_navigation(frame, layout[0]);

        let status_text = if self.is_loading() {
            format!("{} {}", self.spinner.frame(), self.status_message)
                .trim()
                .to_string()
        } else {
            self.status_message.clone()
        };
        let status_line = Paragraph::new(status_text).style(
            Style::default()
                .fg(palette.text_primary)
                .bg(palette.panel_focused_bg)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[1]);

        let mut footer = "q quit";
        if let Some(controller) = self.router.controller() {
            match controller.phase() {
                Phase::Loading => {
                    let loading = Paragraph::new(format!(
                        "{} Loading post #{}…",
                        self.spinner.frame(),
                        controller.post_id()
                    ))
                    .alignment(Alignment::Center)
                    .style(Style::default().fg(palette.text_secondary));
                    frame.render_widget(loading, centered_rect(60, 20, layout[2]));
                }
                Phase::Ready => {
                    if let (Some(view), Some(post)) = (controller.detail_view(), controller.post()) {
                        view.draw(frame, layout[2], post, palette);
                        footer = view.footer_text();
                    }
                }
                Phase::Failed => {
                    if let Some(view) = controller.empty_view() {
                        view.draw(frame, layout[2], palette);
                    }
                }
            }
        }

        let footer = Paragraph::new(footer)
            .style(
                Style::default()
                    .fg(palette.text_secondary)
                    .bg(palette.panel_bg)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, layout[3]);

        if self.confirm_exit.is_some() {
            draw_prompt(
                frame,
                layout[2],
                "Unsaved comment",
                "Discard the comment you are writing? (y/n)",
                palette.accent,
                palette,
            );
        }
    }

    fn draw_navigation(&self, frame: &mut Frame<'_>, area: Rect) {
        let palette = self.palette;
        let mut spans = Vec::new();
        for item in self.navigation.items() {
            let style = if self.navigation.is_active(&item.key) {
                Style::default()
                    .fg(palette.bg)
                    .bg(palette.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(palette.text_secondary)
            };
            spans.push(Span::styled(format!(" {} ", item.name), style));
            spans.push(Span::raw(" "));
        }
        let bar = Paragraph::new(Line::from(spans)).style(Style::default().bg(palette.panel_bg));
        frame.render_widget(bar, area);
    }
}
