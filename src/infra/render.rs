//! Template rendering for subjects and bodies.
//!
//! Supports the tag subset used by the stored templates:
//!
//! - `<%= expr %>` inserts the HTML-escaped value
//! - `<%- expr %>` inserts the raw value
//! - `<%# ... %>` is a comment
//! - `<%%` emits a literal `<%`
//!
//! `expr` is a dotted field path, optionally followed by `||` fallbacks
//! (`first_name || "friend"`). Lookups go through [`SafeContext`], so an
//! unknown field renders as the empty string instead of failing.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::core::{MailerError, MailerResult};

/// Context wrapper that resolves every missing lookup to an empty string.
#[derive(Debug, Clone, Copy)]
pub struct SafeContext<'a> {
    values: &'a Map<String, Value>,
}

impl<'a> SafeContext<'a> {
    /// Wrap a context object.
    pub const fn new(values: &'a Map<String, Value>) -> Self {
        Self { values }
    }

    /// Resolve a dotted path such as `member.first_name`.
    pub fn get(&self, path: &str) -> Option<&'a Value> {
        let mut segments = path.split('.');
        let mut current = self.values.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Resolve `path` to display text; missing and null values are empty.
    pub fn lookup(&self, path: &str) -> Cow<'a, str> {
        self.get(path).map_or(Cow::Borrowed(""), display_value)
    }
}

fn display_value(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        Value::Array(items) => Cow::Owned(
            items
                .iter()
                .map(display_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Cow::Owned(value.to_string()),
    }
}

/// Renders subject patterns and body files against a JSON context.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    /// Create a renderer.
    pub const fn new() -> Self {
        Self
    }

    /// Render a pattern. Failures are logged and yield an empty string.
    pub fn render_string(&self, pattern: &str, context: &Map<String, Value>) -> String {
        match self.try_render_string(pattern, context) {
            Ok(rendered) => rendered,
            Err(e) => {
                error!(error = %e, "failed to render template string");
                String::new()
            }
        }
    }

    /// Render a template file. Failures are logged and yield an empty string.
    pub fn render_file(&self, path: &Path, context: &Map<String, Value>) -> String {
        match self.try_render_file(path, context) {
            Ok(rendered) => rendered,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to render template file");
                String::new()
            }
        }
    }

    /// Render a pattern, reporting malformed tags.
    ///
    /// # Errors
    ///
    /// [`MailerError::Render`] for unterminated tags, scriptlets, or
    /// expressions outside the supported subset.
    pub fn try_render_string(
        &self,
        pattern: &str,
        context: &Map<String, Value>,
    ) -> MailerResult<String> {
        let ctx = SafeContext::new(context);
        let mut out = String::with_capacity(pattern.len());
        let mut rest = pattern;

        while let Some(start) = rest.find("<%") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];

            if let Some(literal) = after_open.strip_prefix('%') {
                out.push_str("<%");
                rest = literal;
                continue;
            }

            let Some(end) = after_open.find("%>") else {
                let offset = pattern.len() - rest.len() + start;
                return Err(MailerError::Render(format!("unterminated tag at offset {offset}")));
            };
            let tag = &after_open[..end];
            rest = &after_open[end + 2..];

            let body = tag.strip_suffix(['-', '_']).unwrap_or(tag);
            match body.chars().next() {
                Some('=') => out.push_str(&escape_html(&evaluate(&ctx, &body[1..])?)),
                Some('-') => out.push_str(&evaluate(&ctx, &body[1..])?),
                Some('#') => {}
                _ => {
                    return Err(MailerError::Render(format!(
                        "unsupported scriptlet `<%{tag}%>`"
                    )))
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Render a template file, reporting missing files and malformed tags.
    ///
    /// # Errors
    ///
    /// [`MailerError::Render`] if the file is missing or malformed,
    /// [`MailerError::Io`] if it cannot be read.
    pub fn try_render_file(&self, path: &Path, context: &Map<String, Value>) -> MailerResult<String> {
        if !path.exists() {
            return Err(MailerError::Render(format!(
                "template file not found: {}",
                path.display()
            )));
        }
        let template = fs::read_to_string(path)?;
        let rendered = self.try_render_string(&template, context)?;
        debug!(path = %path.display(), bytes = rendered.len(), "rendered template file");
        Ok(rendered)
    }
}

fn evaluate<'a>(ctx: &SafeContext<'a>, expr: &str) -> MailerResult<Cow<'a, str>> {
    let mut last = Cow::Borrowed("");
    for alternative in expr.split("||").map(str::trim) {
        let value = if let Some(literal) = string_literal(alternative) {
            Cow::Owned(literal.to_string())
        } else if is_path(alternative) {
            ctx.lookup(alternative.strip_prefix("locals.").unwrap_or(alternative))
        } else {
            return Err(MailerError::Render(format!(
                "unsupported expression `{}`",
                expr.trim()
            )));
        };
        if !value.is_empty() {
            return Ok(value);
        }
        last = value;
    }
    Ok(last)
}

fn string_literal(expr: &str) -> Option<&str> {
    ['"', '\''].into_iter().find_map(|quote| {
        expr.strip_prefix(quote)
            .and_then(|inner| inner.strip_suffix(quote))
    })
}

fn is_path(expr: &str) -> bool {
    !expr.is_empty()
        && expr.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}

/// Escape the characters HTML treats specially.
pub fn escape_html(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn missing_field_renders_empty() {
        let out = TemplateRenderer::new()
            .try_render_string("Hi <%= first_name %>", &ctx(json!({"id": 1})))
            .unwrap();
        assert_eq!(out, "Hi ");
    }

    #[test]
    fn escaped_and_raw_output() {
        let context = ctx(json!({"name": "<b>Ada</b>"}));
        let renderer = TemplateRenderer::new();
        assert_eq!(
            renderer.try_render_string("<%= name %>", &context).unwrap(),
            "&lt;b&gt;Ada&lt;/b&gt;"
        );
        assert_eq!(renderer.try_render_string("<%- name %>", &context).unwrap(), "<b>Ada</b>");
    }

    #[test]
    fn fallbacks_comments_and_literals() {
        let context = ctx(json!({"first_name": "", "unit": {"name": "Media"}, "units": ["a", "b"]}));
        let renderer = TemplateRenderer::new();
        let out = renderer
            .try_render_string(
                "<%# greeting %>Dear <%= first_name || \"friend\" %> of <%= unit.name %> (<%= units %>) <%%",
                &context,
            )
            .unwrap();
        assert_eq!(out, "Dear friend of Media (a,b) <%");
    }

    #[test]
    fn malformed_tags_fail_softly() {
        let renderer = TemplateRenderer::new();
        let context = Map::new();
        assert!(renderer.try_render_string("Hi <%= name", &context).is_err());
        assert!(renderer.try_render_string("<% if (x) { %>", &context).is_err());
        assert_eq!(renderer.render_string("Hi <%= name", &context), "");
    }

    #[test]
    fn trim_markers_are_accepted() {
        let context = ctx(json!({"n": 3}));
        let out = TemplateRenderer::new()
            .try_render_string("<%= n -%>!", &context)
            .unwrap();
        assert_eq!(out, "3!");
    }
}
