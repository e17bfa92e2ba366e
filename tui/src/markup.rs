//! Markup to Terminal Lines
//!
//! The core renders replies into a small, fully escaped tag set:
//! `<h1>`-`<h3>`, `<strong>`, `<em>`, `<code>`, `<pre>` (optionally with a
//! `lang-*` class), and `<br>`. Every literal `<`, `>` and `&` in the text is
//! an entity, so any `<` seen here starts a tag.
//!
//! This module turns that markup into styled ratatui [`Line`]s and wraps
//! them to the pane width without losing per-span styling.

use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::theme;

/// Indent for code block lines
const PRE_INDENT: &str = "  ";

/// Convert rendered markup into styled lines
///
/// `base` is the style for untagged text. Unknown tags are kept as literal
/// text.
#[must_use]
pub fn markup_to_lines(markup: &str, base: Style) -> Vec<Line<'static>> {
    let mut builder = LineBuilder::new(base);
    let mut rest = markup;

    while let Some(open) = rest.find('<') {
        builder.push_text(&rest[..open]);
        let after = &rest[open..];
        let Some(close) = after.find('>') else {
            builder.push_text(after);
            rest = "";
            break;
        };
        let tag = &after[1..close];
        if !builder.apply_tag(tag) {
            builder.push_text(&after[..=close]);
        }
        rest = &after[close + 1..];
    }
    builder.push_text(rest);
    builder.finish()
}

/// Prefix the first line with a styled label (e.g. `"You: "`)
#[must_use]
pub fn with_prefix(mut lines: Vec<Line<'static>>, prefix: Span<'static>) -> Vec<Line<'static>> {
    match lines.first_mut() {
        Some(first) => first.spans.insert(0, prefix),
        None => lines.push(Line::from(vec![prefix])),
    }
    lines
}

/// Decode the three entities the renderer emits
#[must_use]
pub fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Concatenated text of a line, without styling
#[must_use]
pub fn plain_text(line: &Line<'_>) -> String {
    line.spans.iter().map(|s| s.content.as_ref()).collect()
}

// ============================================================================
// Builder
// ============================================================================

struct LineBuilder {
    base: Style,
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    strong: usize,
    em: usize,
    code: bool,
    pre: bool,
    heading: bool,
}

impl LineBuilder {
    fn new(base: Style) -> Self {
        Self {
            base,
            lines: Vec::new(),
            current: Vec::new(),
            strong: 0,
            em: 0,
            code: false,
            pre: false,
            heading: false,
        }
    }

    fn style(&self) -> Style {
        let mut style = self.base;
        if self.heading {
            style = style.fg(theme::HEADING).add_modifier(Modifier::BOLD);
        }
        if self.code || self.pre {
            style = style.fg(theme::CODE);
        }
        if self.strong > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.em > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        style
    }

    fn push_text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let text = decode_entities(raw);
        let style = self.style();
        for (i, segment) in text.split('\n').enumerate() {
            if i > 0 {
                self.break_line();
            }
            if segment.is_empty() {
                continue;
            }
            if self.pre && self.current.is_empty() {
                self.current.push(Span::raw(PRE_INDENT));
            }
            self.current.push(Span::styled(segment.to_string(), style));
        }
    }

    fn break_line(&mut self) {
        let spans = std::mem::take(&mut self.current);
        self.lines.push(Line::from(spans));
    }

    /// Close the current line only if it has content
    fn end_block(&mut self) {
        if !self.current.is_empty() {
            self.break_line();
        }
    }

    /// Returns false for tags outside the supported set
    fn apply_tag(&mut self, tag: &str) -> bool {
        match tag {
            "br" => self.break_line(),
            "strong" => self.strong += 1,
            "/strong" => self.strong = self.strong.saturating_sub(1),
            "em" => self.em += 1,
            "/em" => self.em = self.em.saturating_sub(1),
            "code" => self.code = true,
            "/code" => self.code = false,
            "h1" | "h2" | "h3" => {
                self.end_block();
                self.heading = true;
            }
            "/h1" | "/h2" | "/h3" => {
                self.break_line();
                self.heading = false;
            }
            "/pre" => {
                self.end_block();
                self.pre = false;
            }
            _ => {
                let Some(attrs) = tag.strip_prefix("pre") else {
                    return false;
                };
                let lang = attrs
                    .trim()
                    .strip_prefix("class=\"lang-")
                    .and_then(|s| s.strip_suffix('"'));
                if lang.is_none() && !attrs.is_empty() {
                    return false;
                }
                self.end_block();
                if let Some(lang) = lang {
                    self.lines.push(Line::from(vec![
                        Span::raw(PRE_INDENT),
                        Span::styled(
                            format!("[{lang}]"),
                            Style::default().fg(theme::CODE_LANG),
                        ),
                    ]));
                }
                self.pre = true;
            }
        }
        true
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.end_block();
        self.lines
    }
}

// ============================================================================
// Wrapping
// ============================================================================

/// Wrap a styled line to `width` columns
///
/// Breaks between words where possible and splits words wider than the whole
/// pane. Whitespace at a break point is dropped.
#[must_use]
pub fn wrap_line(line: &Line<'static>, width: usize) -> Vec<Line<'static>> {
    if width == 0 || line.width() <= width {
        return vec![line.clone()];
    }

    let mut out = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut used = 0usize;

    for span in &line.spans {
        for token in tokens(&span.content) {
            let token_width = token.width();
            let is_space = token.chars().all(char::is_whitespace);

            if used + token_width <= width {
                current.push(Span::styled(token.to_string(), span.style));
                used += token_width;
                continue;
            }

            if is_space {
                flush(&mut out, &mut current);
                used = 0;
                continue;
            }

            if token_width <= width {
                if !current.is_empty() {
                    flush(&mut out, &mut current);
                }
                current.push(Span::styled(token.to_string(), span.style));
                used = token_width;
                continue;
            }

            // Word wider than the pane: fill character by character
            let mut piece = String::new();
            for c in token.chars() {
                let w = c.width().unwrap_or(0);
                if used + w > width {
                    if !piece.is_empty() {
                        current.push(Span::styled(std::mem::take(&mut piece), span.style));
                    }
                    flush(&mut out, &mut current);
                    used = 0;
                }
                piece.push(c);
                used += w;
            }
            if !piece.is_empty() {
                current.push(Span::styled(piece, span.style));
            }
        }
    }

    if !current.is_empty() {
        out.push(Line::from(current));
    }
    out
}

/// End the current line, dropping whitespace left dangling at the break
fn flush(out: &mut Vec<Line<'static>>, current: &mut Vec<Span<'static>>) {
    while current
        .last()
        .is_some_and(|s| s.content.chars().all(char::is_whitespace))
    {
        current.pop();
    }
    out.push(Line::from(std::mem::take(current)));
}

/// Split into alternating runs of whitespace and non-whitespace
fn tokens(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_space: Option<bool> = None;

    for (i, c) in text.char_indices() {
        let space = c.is_whitespace();
        if in_space.is_some_and(|s| s != space) {
            out.push(&text[start..i]);
            start = i;
        }
        in_space = Some(space);
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}
