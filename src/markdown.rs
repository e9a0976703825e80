//! Comment text rendering.
//!
//! Comments are markdown. Inline emphasis is kept as terminal styles;
//! block structure (quotes, lists, code) becomes prefixed lines. Raw HTML is
//! dropped.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};

const QUOTE_COLOR: Color = Color::Green;
const CODE_COLOR: Color = Color::Cyan;
const LINK_COLOR: Color = Color::Blue;
const MARKER_COLOR: Color = Color::Yellow;

pub fn render(input: &str) -> Text<'static> {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_STRIKETHROUGH);

    let mut writer = CommentWriter::default();
    for event in Parser::new_ext(input, opts) {
        writer.event(event);
    }
    writer.finish()
}

/// First non-empty line of the comment as plain text, for one-line previews.
pub fn preview(input: &str, max_chars: usize) -> String {
    let text = render(input);
    let first = text
        .lines
        .iter()
        .map(|line| {
            line.spans
                .iter()
                .map(|span| span.content.as_ref())
                .collect::<String>()
        })
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default();
    let trimmed = first.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[derive(Default)]
struct CommentWriter {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    styles: Vec<Style>,
    quote_depth: usize,
    lists: Vec<Option<u64>>,
    pending_marker: Option<String>,
    in_code_block: bool,
    links: Vec<String>,
}

impl CommentWriter {
    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if self.in_code_block {
                    for line in text.lines() {
                        self.lines.push(Line::from(Span::styled(
                            format!("  {line}"),
                            Style::default().fg(CODE_COLOR),
                        )));
                    }
                } else {
                    self.push(text.into_string());
                }
            }
            Event::Code(code) => {
                let style = self.style().fg(CODE_COLOR);
                self.spans.push(Span::styled(code.into_string(), style));
            }
            Event::SoftBreak => self.push(" ".to_string()),
            Event::HardBreak => self.break_line(),
            Event::Rule => {
                self.break_line();
                self.lines.push(Line::from("―".repeat(16)));
            }
            Event::Html(_) | Event::InlineHtml(_) => {}
            Event::FootnoteReference(_) | Event::TaskListMarker(_) => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph | Tag::Heading { .. } => self.break_line(),
            Tag::BlockQuote => {
                self.break_line();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.break_line();
                self.in_code_block = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        self.lines.push(Line::from(Span::styled(
                            format!("  [{lang}]"),
                            Style::default().add_modifier(Modifier::DIM),
                        )));
                    }
                }
            }
            Tag::List(start) => {
                self.break_line();
                self.lists.push(start);
            }
            Tag::Item => {
                self.break_line();
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}.");
                        *n += 1;
                        marker
                    }
                    _ => "•".to_string(),
                };
                self.pending_marker = Some(format!("{}{marker} ", "  ".repeat(depth)));
            }
            Tag::Emphasis => self.push_style(Modifier::ITALIC),
            Tag::Strong => self.push_style(Modifier::BOLD),
            Tag::Strikethrough => self.push_style(Modifier::CROSSED_OUT),
            Tag::Link { dest_url, .. } => {
                self.links.push(dest_url.into_string());
                let style = self.style().fg(LINK_COLOR).add_modifier(Modifier::UNDERLINED);
                self.styles.push(style);
            }
            Tag::Image { .. } => {
                let style = self.style().fg(LINK_COLOR);
                self.spans.push(Span::styled("[image: ", style));
                self.styles.push(style);
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item => self.break_line(),
            TagEnd::BlockQuote => {
                self.break_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock => self.in_code_block = false,
            TagEnd::List(_) => {
                self.break_line();
                self.lists.pop();
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                self.styles.pop();
            }
            TagEnd::Image => {
                if let Some(style) = self.styles.pop() {
                    self.spans.push(Span::styled("]", style));
                }
            }
            TagEnd::Link => {
                self.styles.pop();
                if let Some(url) = self.links.pop() {
                    let shown = self
                        .spans
                        .last()
                        .map(|span| span.content.as_ref() == url)
                        .unwrap_or(false);
                    if !shown {
                        self.spans.push(Span::styled(
                            format!(" <{url}>"),
                            Style::default().add_modifier(Modifier::DIM),
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, modifier: Modifier) {
        let style = self.style().add_modifier(modifier);
        self.styles.push(style);
    }

    fn push(&mut self, text: String) {
        let style = self.style();
        self.spans.push(Span::styled(text, style));
    }

    fn break_line(&mut self) {
        if self.spans.is_empty() {
            return;
        }
        let mut spans = Vec::with_capacity(self.spans.len() + 2);
        if self.quote_depth > 0 {
            spans.push(Span::styled(
                format!("{} ", ">".repeat(self.quote_depth)),
                Style::default().fg(QUOTE_COLOR),
            ));
        }
        if let Some(marker) = self.pending_marker.take() {
            spans.push(Span::styled(marker, Style::default().fg(MARKER_COLOR)));
        }
        let quoted = self.quote_depth > 0;
        spans.extend(self.spans.drain(..).map(|span| {
            if quoted {
                Span::styled(span.content, span.style.fg(QUOTE_COLOR))
            } else {
                span
            }
        }));
        self.lines.push(Line::from(spans));
    }

    fn finish(mut self) -> Text<'static> {
        self.break_line();
        if self.lines.is_empty() {
            self.lines.push(Line::default());
        }
        Text::from(self.lines)
    }
}
