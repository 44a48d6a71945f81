//! Tests for [`KeyBuilder`]: key composition, overrides and uniqueness.

use std::io;
use std::sync::{Arc, Mutex};

use mimir::{CacheKey, KeyBuilder};
use proptest::prelude::*;
use serde_json::{Value, json};

fn auto_key(scope: &str, call_site: &str, fragments: Vec<Value>) -> CacheKey {
    KeyBuilder::new(scope)
        .call_site(call_site)
        .fragments(fragments)
        .build()
        .0
}

// =============================================================================
// Concrete scenarios
// =============================================================================

#[test]
fn instance_call_key_components() {
    let (key, args) = KeyBuilder::new("Post")
        .content_digest(Some("d1".to_string()))
        .call_site("cached_comments")
        .instance(Some("42".to_string()))
        .build();

    assert_eq!(key.components(), ["Post", "d1", "cached_comments", "42"]);
    assert!(args.is_empty());
}

#[test]
fn override_appended_not_substituted() {
    let key = auto_key("Comment", "cached_for_post", vec![json!("A"), json!({ "cache_key": "B" })]);
    let tail = &key.components()[key.len() - 2..];
    assert_eq!(tail, ["A", "B"]);
}

#[test]
fn distinct_overrides_give_distinct_keys() {
    let one = auto_key("Comment", "cached_for_post", vec![json!(1), json!({ "cache_key": 1 })]);
    let two = auto_key("Comment", "cached_for_post", vec![json!(2), json!({ "cache_key": 2 })]);
    assert_ne!(one, two);
    assert_eq!(one.components(), ["Comment", "cached_for_post", "1", "1"]);
}

#[test]
fn skip_auto_key_omits_prefix() {
    let (key, _) = KeyBuilder::new("Post")
        .content_digest(Some("d1".to_string()))
        .call_site("cached_comments")
        .instance(Some("42".to_string()))
        .fragments(vec![json!("only"), json!({ "cache_key": "me" })])
        .skip_auto_key(true)
        .build();

    assert_eq!(key.components(), ["only", "me"]);
}

#[test]
fn same_inputs_same_key() {
    let a = auto_key("Post", "cached_all", vec![json!({ "b": 1, "a": 2 }), json!(3.5)]);
    let b = auto_key("Post", "cached_all", vec![json!({ "a": 2, "b": 1 }), json!(3.5)]);
    assert_eq!(a, b);
    assert_eq!(a.fingerprint(), b.fingerprint());
}

#[test]
fn fragment_order_matters() {
    let a = auto_key("Post", "cached_all", vec![json!("x"), json!("y")]);
    let b = auto_key("Post", "cached_all", vec![json!("y"), json!("x")]);
    assert_ne!(a, b);
}

#[test]
fn digest_changes_key() {
    let v1 = KeyBuilder::new("Post")
        .content_digest(Some("v1".to_string()))
        .call_site("cached_all")
        .build()
        .0;
    let v2 = KeyBuilder::new("Post")
        .content_digest(Some("v2".to_string()))
        .call_site("cached_all")
        .build()
        .0;
    assert_ne!(v1, v2);
}

#[test]
fn override_value_never_matches_plain_argument() {
    let overridden = auto_key("Comment", "cached_echo", vec![json!({ "cache_key": 1 })]);
    let plain = auto_key("Comment", "cached_echo", vec![json!(1)]);
    assert_eq!(overridden.components(), plain.components());
    assert_ne!(overridden, plain);
}

// =============================================================================
// Debug logging
// =============================================================================

/// `io::Write` into a shared buffer, for capturing formatted events.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn build_logged(debug: bool) -> (CacheKey, String) {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let key = tracing::subscriber::with_default(subscriber, || {
        KeyBuilder::new("Post")
            .call_site("cached_all")
            .debug(debug)
            .build()
            .0
    });
    (key, captured.text())
}

#[test]
fn debug_flag_logs_key_without_changing_it() {
    let (quiet, quiet_log) = build_logged(false);
    let (loud, loud_log) = build_logged(true);

    assert_eq!(quiet, loud);
    assert!(!quiet_log.contains("composed cache key"), "{quiet_log}");
    assert!(loud_log.contains("composed cache key"), "{loud_log}");
    assert!(loud_log.contains("mimir::key"), "{loud_log}");
    assert!(loud_log.contains("cached_all"), "{loud_log}");
}

// =============================================================================
// Properties
// =============================================================================

fn name_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z_][A-Za-z0-9_]{0,12}"
}

fn fragment_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-z0-9]{1,8}".prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
    ]
}

/// Plain fragments, optionally followed by a `{"cache_key": ..}` override.
fn fragments_strategy() -> impl Strategy<Value = (Vec<Value>, Option<Value>)> {
    (
        prop::collection::vec(fragment_strategy(), 0..4),
        prop::option::of(fragment_strategy()),
    )
}

fn with_override(plain: &[Value], override_key: &Option<Value>) -> Vec<Value> {
    let mut fragments = plain.to_vec();
    if let Some(value) = override_key {
        fragments.push(json!({ "cache_key": value }));
    }
    fragments
}

// integers and digit strings render identically, so inputs compare as text
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Property: distinct (scope, call site, fragments, override) never share a key.
    #[test]
    fn prop_distinct_inputs_distinct_keys(
        scope1 in name_strategy(),
        scope2 in name_strategy(),
        site1 in name_strategy(),
        site2 in name_strategy(),
        (plain1, override1) in fragments_strategy(),
        (plain2, override2) in fragments_strategy(),
    ) {
        let key1 = auto_key(&scope1, &site1, with_override(&plain1, &override1));
        let key2 = auto_key(&scope2, &site2, with_override(&plain2, &override2));

        let text = |v: &[Value]| -> Vec<String> { v.iter().map(as_text).collect() };
        let same_input = scope1 == scope2
            && site1 == site2
            && text(&plain1) == text(&plain2)
            && override1.as_ref().map(as_text) == override2.as_ref().map(as_text);

        if same_input {
            prop_assert_eq!(&key1, &key2);
        } else {
            prop_assert_ne!(&key1, &key2);
            prop_assert_ne!(key1.fingerprint(), key2.fingerprint());
        }
    }

    /// Property: building is deterministic.
    #[test]
    fn prop_key_is_deterministic(
        scope in name_strategy(),
        site in name_strategy(),
        (plain, override_key) in fragments_strategy(),
    ) {
        let fragments = with_override(&plain, &override_key);
        prop_assert_eq!(auto_key(&scope, &site, fragments.clone()), auto_key(&scope, &site, fragments));
    }
}
