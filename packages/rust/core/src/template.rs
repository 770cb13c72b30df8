//! Templating host: named partials plus a small mustache-style renderer.
//!
//! Supported tags:
//! - `{{> name}}`: include a registered partial (recursively)
//! - `{{{path}}}`: raw substitution
//! - `{{path}}`: HTML-escaped substitution
//!
//! `path` is a dotted lookup into the JSON data (`plugins.build-info.built_at`).
//! Missing values render as the empty string.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

use labbuild_shared::{LabBuildError, Result};

/// Maximum partial nesting before rendering is aborted.
const MAX_PARTIAL_DEPTH: usize = 16;

/// Registry of partials and the renderer that expands them.
pub trait TemplateHost {
    /// Register (or replace) a partial under its logical name.
    fn register_partial(&mut self, name: &str, source: String);

    /// Whether a partial with this name is registered.
    fn has_partial(&self, name: &str) -> bool;

    /// Render a template string against `data`.
    fn render(&self, template: &str, data: &Value) -> Result<String>;
}

/// Default in-memory [`TemplateHost`].
#[derive(Debug, Clone, Default)]
pub struct Templates {
    partials: HashMap<String, String>,
}

impl Templates {
    pub fn new() -> Self {
        Self::default()
    }

    fn expand_partials(&self, template: &str, depth: usize) -> Result<String> {
        static PARTIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"\{\{>\s*([A-Za-z0-9_\-]+)\s*\}\}").expect("valid regex")
        });

        if !PARTIAL_RE.is_match(template) {
            return Ok(template.to_string());
        }
        if depth >= MAX_PARTIAL_DEPTH {
            return Err(LabBuildError::template(format!(
                "partials nested deeper than {MAX_PARTIAL_DEPTH} levels"
            )));
        }

        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in PARTIAL_RE.captures_iter(template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let name = &caps[1];
            let source = self
                .partials
                .get(name)
                .ok_or_else(|| LabBuildError::template(format!("unknown partial '{name}'")))?;

            out.push_str(&template[last..whole.start()]);
            out.push_str(&self.expand_partials(source, depth + 1)?);
            last = whole.end();
        }
        out.push_str(&template[last..]);

        Ok(out)
    }
}

impl TemplateHost for Templates {
    fn register_partial(&mut self, name: &str, source: String) {
        debug!(partial = name, len = source.len(), "registered partial");
        self.partials.insert(name.to_string(), source);
    }

    fn has_partial(&self, name: &str) -> bool {
        self.partials.contains_key(name)
    }

    fn render(&self, template: &str, data: &Value) -> Result<String> {
        static VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(
                r"\{\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}\}|\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}",
            )
            .expect("valid regex")
        });

        let expanded = self.expand_partials(template, 0)?;

        // Single pass: substituted values are never re-scanned for tags.
        let rendered = VAR_RE.replace_all(&expanded, |caps: &Captures| {
            if let Some(raw) = caps.get(1) {
                value_to_string(lookup(data, raw.as_str()))
            } else {
                escape_html(&value_to_string(lookup(data, &caps[2])))
            }
        });

        Ok(rendered.into_owned())
    }
}

/// Resolve a dotted path against JSON data.
fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    if path == "." || path == "this" {
        return Some(data);
    }
    path.split('.').try_fold(data, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn value_to_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn substitutes_escaped_and_raw_values() {
        let t = Templates::new();
        let data = json!({ "title": "<Aim>", "content": "<p>hi</p>" });
        let out = t.render("<h1>{{title}}</h1>{{{content}}}", &data).unwrap();
        assert_eq!(out, "<h1>&lt;Aim&gt;</h1><p>hi</p>");
    }

    #[test]
    fn dotted_lookup_into_nested_data() {
        let t = Templates::new();
        let data = json!({ "plugins": { "build-info": { "unit_count": 3 } }, "menu": ["a", "b"] });
        let out = t
            .render("{{ plugins.build-info.unit_count }}/{{menu.1}}", &data)
            .unwrap();
        assert_eq!(out, "3/b");
    }

    #[test]
    fn missing_values_render_empty() {
        let t = Templates::new();
        assert_eq!(t.render("[{{nope.deeper}}]", &json!({})).unwrap(), "[]");
    }

    #[test]
    fn partials_expand_recursively() {
        let mut t = Templates::new();
        t.register_partial("header", "<header>{{> logo}}</header>".into());
        t.register_partial("logo", "<img alt=\"{{name}}\">".into());
        assert!(t.has_partial("logo"));

        let out = t.render("{{> header}}", &json!({ "name": "Lab" })).unwrap();
        assert_eq!(out, "<header><img alt=\"Lab\"></header>");
    }

    #[test]
    fn unknown_partial_is_an_error() {
        let t = Templates::new();
        let err = t.render("{{> footer}}", &json!({})).unwrap_err();
        assert!(err.to_string().contains("unknown partial 'footer'"));
    }

    #[test]
    fn self_referencing_partial_is_bounded() {
        let mut t = Templates::new();
        t.register_partial("loop", "x{{> loop}}".into());
        let err = t.render("{{> loop}}", &json!({})).unwrap_err();
        assert!(err.to_string().contains("nested deeper"));
    }

    #[test]
    fn substituted_content_is_not_rescanned() {
        let t = Templates::new();
        let data = json!({ "content": "{{secret}}", "secret": "leak" });
        assert_eq!(t.render("{{{content}}}", &data).unwrap(), "{{secret}}");
    }
}
