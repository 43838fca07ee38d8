//! Tests for the template renderer

use std::fs;

use roster_mailer::infra::render::{escape_html, SafeContext, TemplateRenderer};
use serde_json::{json, Map, Value};

fn ctx(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[test]
fn test_safe_context_missing_is_empty() {
    let values = ctx(json!({"first_name": "Ada", "unit": {"name": "Media"}, "n": null}));
    let safe = SafeContext::new(&values);
    assert_eq!(safe.lookup("first_name"), "Ada");
    assert_eq!(safe.lookup("unit.name"), "Media");
    assert_eq!(safe.lookup("last_name"), "");
    assert_eq!(safe.lookup("unit.missing.deeper"), "");
    assert_eq!(safe.lookup("n"), "");
}

#[test]
fn test_subject_with_absent_field() {
    let out = TemplateRenderer::new().render_string(
        "Hi <%= first_name %>",
        &ctx(json!({"id": 1, "email_address": "a@x.com"})),
    );
    assert_eq!(out, "Hi ");
}

#[test]
fn test_render_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("welcome.html");
    fs::write(&path, "<p>Welcome <%= first_name %> <%= last_name %>!</p>").unwrap();
    let out = TemplateRenderer::new()
        .try_render_file(&path, &ctx(json!({"first_name": "Ada"})))
        .unwrap();
    assert_eq!(out, "<p>Welcome Ada !</p>");
}

#[test]
fn test_missing_file_renders_empty() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = TemplateRenderer::new();
    let missing = dir.path().join("nope.html");
    assert!(renderer.try_render_file(&missing, &Map::new()).is_err());
    assert_eq!(renderer.render_file(&missing, &Map::new()), "");
}

#[test]
fn test_escape_html() {
    assert_eq!(escape_html("plain"), "plain");
    assert_eq!(escape_html(r#"<a href="x">&'"#), "&lt;a href=&#34;x&#34;&gt;&amp;&#39;");
}
