//! Pre-render cleanup pipeline for Markdown source.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! Authored content arrives from many editors; the pipeline normalizes it
//! before it reaches the renderer.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on authored Markdown text.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = strip_bom(md).to_string();

    result = normalize_line_endings(&result);
    result = strip_frontmatter(&result);
    result = fix_code_block_languages(&result);
    result = clean_blank_lines(&result);
    result = normalize_whitespace(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Byte order mark
// ---------------------------------------------------------------------------

fn strip_bom(md: &str) -> &str {
    md.strip_prefix('\u{feff}').unwrap_or(md)
}

// ---------------------------------------------------------------------------
// Pass 2: Line endings
// ---------------------------------------------------------------------------

/// Convert CRLF and lone CR to LF.
fn normalize_line_endings(md: &str) -> String {
    md.replace("\r\n", "\n").replace('\r', "\n")
}

// ---------------------------------------------------------------------------
// Pass 3: YAML frontmatter
// ---------------------------------------------------------------------------

/// Drop a leading `---` fenced YAML block. Only the very first line may open it,
/// and the next line must be a `key:` entry; otherwise the `---` is a thematic break.
fn strip_frontmatter(md: &str) -> String {
    static FRONTMATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)\A---\n[A-Za-z0-9_\-]+:.*?\n---[ \t]*(?:\n|\z)").expect("valid regex")
    });

    FRONTMATTER_RE.replace(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Code block language hints
// ---------------------------------------------------------------------------

/// Strip class-style prefixes (`language-js`, `lang-python`) from fence info.
fn fix_code_block_languages(md: &str) -> String {
    static LANG_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^```(?:language-|lang-)(\w+)").expect("valid regex")
    });

    LANG_PREFIX_RE.replace_all(md, "```$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Excessive blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 3+ blank lines into exactly 2, outside fenced code.
fn clean_blank_lines(md: &str) -> String {
    let mut out = Vec::new();
    let mut blank_run = 0;

    for (line, fenced) in tag_fenced_lines(md) {
        if !fenced && line.is_empty() {
            blank_run += 1;
            if blank_run > 2 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line);
    }

    out.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 6: Trailing whitespace
// ---------------------------------------------------------------------------

/// Trim trailing spaces, keeping Markdown hard breaks (two or more spaces).
/// Lines inside fenced code are left as written.
fn normalize_whitespace(md: &str) -> String {
    tag_fenced_lines(md)
        .into_iter()
        .map(|(line, fenced)| {
            if fenced {
                line.to_string()
            } else if line.ends_with("  ") && !line.trim().is_empty() {
                format!("{}  ", line.trim_end())
            } else {
                line.trim_end().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 7: Ensure trailing newline
// ---------------------------------------------------------------------------

/// Ensure the text ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    format!("{trimmed}\n")
}

// ---------------------------------------------------------------------------
// Fenced code tracking
// ---------------------------------------------------------------------------

/// Split into lines, flagging those inside a fenced code block.
///
/// Fence lines themselves are not flagged. A block opened with backticks only
/// closes on backticks, likewise for tildes.
fn tag_fenced_lines(md: &str) -> Vec<(&str, bool)> {
    let mut open: Option<char> = None;
    md.split('\n')
        .map(|line| {
            let marker = fence_marker(line);
            match (open, marker) {
                (None, Some(m)) => {
                    open = Some(m);
                    (line, false)
                }
                (Some(o), Some(m)) if o == m => {
                    open = None;
                    (line, false)
                }
                (Some(_), _) => (line, true),
                (None, None) => (line, false),
            }
        })
        .collect()
}

fn fence_marker(line: &str) -> Option<char> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some('`')
    } else if trimmed.starts_with("~~~") {
        Some('~')
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
