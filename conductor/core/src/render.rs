//! Incremental Renderer
//!
//! Pure text → markup conversion for assistant output. The renderer holds no
//! state between calls: the Conversation re-renders the full accumulated text
//! after every fragment, so the markup after the last fragment is identical
//! to rendering the finished text once.
//!
//! # Rule order
//!
//! 1. HTML-escape `&`, `<`, `>` (agent text can never inject markup)
//! 2. Literal `\n` escape sequences become real newlines
//! 3. Fenced code blocks are lifted out (language-tagged before generic)
//! 4. Inline code spans are lifted out
//! 5. Headings `###`, `##`, `#` at line start
//! 6. Bold `**…**`, then italic `*…*`
//! 7. Remaining newlines become `<br>`
//! 8. Lifted code is put back, newlines inside it untouched
//!
//! Lifting code out before steps 5-7 is what keeps `*` and `#` inside code
//! literal.

use std::sync::OnceLock;

use regex::{Captures, Regex};

const SLOT_OPEN: char = '\u{E000}';
const SLOT_CLOSE: char = '\u{E001}';

struct Rules {
    fenced_tagged: Regex,
    fenced_generic: Regex,
    inline_code: Regex,
    h3: Regex,
    h2: Regex,
    h1: Regex,
    bold: Regex,
    italic: Regex,
    slot: Regex,
}

impl Rules {
    fn build() -> Result<Self, regex::Error> {
        Ok(Self {
            fenced_tagged: Regex::new(r"(?s)```([A-Za-z0-9_+\-]+)\n(.*?)\n?```")?,
            fenced_generic: Regex::new(r"(?s)```\n?(.*?)```")?,
            inline_code: Regex::new(r"`([^`]+)`")?,
            h3: Regex::new(r"(?m)^### ([^\n]*)\n?")?,
            h2: Regex::new(r"(?m)^## ([^\n]*)\n?")?,
            h1: Regex::new(r"(?m)^# ([^\n]*)\n?")?,
            bold: Regex::new(r"(?s)\*\*(.+?)\*\*")?,
            italic: Regex::new(r"(?s)\*(.+?)\*")?,
            slot: Regex::new("\u{E000}([0-9]+)\u{E001}")?,
        })
    }
}

fn rules() -> Option<&'static Rules> {
    static RULES: OnceLock<Option<Rules>> = OnceLock::new();
    RULES
        .get_or_init(|| match Rules::build() {
            Ok(rules) => Some(rules),
            Err(e) => {
                tracing::error!(error = %e, "renderer rules failed to compile");
                None
            }
        })
        .as_ref()
}

/// Render accumulated plain text into display markup
///
/// Output tags: `<br>`, `<h1>`–`<h3>`, `<strong>`, `<em>`, `<code>`, and
/// `<pre>` / `<pre class="lang-…">` wrapping a `<code>`.
#[must_use]
pub fn render(text: &str) -> String {
    let text = escape_html(text).replace("\\n", "\n");
    let Some(rules) = rules() else {
        return text.replace('\n', "<br>");
    };
    let mut slots: Vec<String> = Vec::new();

    let text = rules.fenced_tagged.replace_all(&text, |caps: &Captures| {
        stash(
            &mut slots,
            format!(
                "<pre class=\"lang-{}\"><code>{}</code></pre>",
                &caps[1], &caps[2]
            ),
        )
    });
    let text = rules.fenced_generic.replace_all(&text, |caps: &Captures| {
        stash(&mut slots, format!("<pre><code>{}</code></pre>", &caps[1]))
    });
    let text = rules.inline_code.replace_all(&text, |caps: &Captures| {
        stash(&mut slots, format!("<code>{}</code>", &caps[1]))
    });

    let text = rules.h3.replace_all(&text, "<h3>$1</h3>");
    let text = rules.h2.replace_all(&text, "<h2>$1</h2>");
    let text = rules.h1.replace_all(&text, "<h1>$1</h1>");
    let text = rules.bold.replace_all(&text, "<strong>$1</strong>");
    let text = rules.italic.replace_all(&text, "<em>$1</em>");
    let text = text.replace('\n', "<br>");

    rules
        .slot
        .replace_all(&text, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| slots.get(i))
                .cloned()
                .unwrap_or_default()
        })
        .into_owned()
}

fn stash(slots: &mut Vec<String>, markup: String) -> String {
    slots.push(markup);
    format!("{SLOT_OPEN}{}{SLOT_CLOSE}", slots.len() - 1)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            SLOT_OPEN | SLOT_CLOSE => {}
            _ => out.push(c),
        }
    }
    out
}
