//! Markdown-to-HTML rendering for experiment content.
//!
//! Authored Markdown first runs through a cleanup pipeline (BOM, line
//! endings, frontmatter, fence hints), then is rendered with `pulldown-cmark`.
//! Math spans are emitted as `math-inline` / `math-display` elements for the
//! client-side math renderer shipped with the UI assets.

mod cleanup;

use std::sync::LazyLock;

use pulldown_cmark::{Options, Parser, html};
use regex::Regex;
use tracing::debug;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of rendering a Markdown document.
#[derive(Debug, Clone)]
pub struct RenderResult {
    /// Rendered HTML fragment.
    pub html: String,
    /// Text of the first H1, if any.
    pub title: Option<String>,
    /// Approximate word count (code blocks excluded).
    pub word_count: usize,
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Render Markdown to an HTML fragment with title and word count.
pub fn render(markdown: &str) -> RenderResult {
    let cleaned = cleanup::run_pipeline(markdown);

    let parser = Parser::new_ext(&cleaned, options());
    let mut html_out = String::with_capacity(cleaned.len() * 3 / 2);
    html::push_html(&mut html_out, parser);

    let title = extract_title_from_markdown(&cleaned);
    let word_count = count_words(&cleaned);

    debug!(
        source_len = markdown.len(),
        html_len = html_out.len(),
        word_count,
        "markdown rendered"
    );

    RenderResult {
        html: html_out,
        title,
        word_count,
    }
}

/// Render Markdown to HTML.
pub fn render_markdown(markdown: &str) -> String {
    render(markdown).html
}

/// Render a one-paragraph fragment without the surrounding `<p>` element.
///
/// Used for short strings such as the experiment name.
pub fn render_inline(markdown: &str) -> String {
    let html_out = render_markdown(markdown);
    let trimmed = html_out.trim();

    match trimmed
        .strip_prefix("<p>")
        .and_then(|s| s.strip_suffix("</p>"))
    {
        Some(inner) if !inner.contains("<p>") => inner.to_string(),
        _ => trimmed.to_string(),
    }
}

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES
        | Options::ENABLE_MATH
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn extract_title_from_markdown(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid regex"));

    H1_RE.captures(md).map(|c| c[1].trim().to_string())
}

fn count_words(md: &str) -> usize {
    static CODE_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    let without_code = CODE_BLOCK_RE.replace_all(md, "");
    without_code
        .split_whitespace()
        .filter(|w| !w.chars().all(|c| c == '#'))
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
