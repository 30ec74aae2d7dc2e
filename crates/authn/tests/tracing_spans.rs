//! Verifies the spans and events emitted along the verification path:
//! tenant-tagged verification spans, key cache spans, rejection reasons and
//! audit events.

#![allow(clippy::expect_used)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tenantgate_authn::testutil::{Harness, TestKey, id_token_claims, issuer_for, sign_token};
use tracing::{
    Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

// ---------------------------------------------------------------------------
// Collecting layer: records span names, their fields and event fields
// ---------------------------------------------------------------------------

type Fields = HashMap<String, String>;

#[derive(Clone, Default)]
struct Collector {
    spans: Arc<Mutex<Vec<(String, Fields)>>>,
    events: Arc<Mutex<Vec<Fields>>>,
}

#[derive(Default)]
struct FieldVisitor(Fields);

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_owned(), value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_owned(), format!("{value:?}"));
    }
}

impl<S> tracing_subscriber::Layer<S> for Collector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut fields = FieldVisitor::default();
        attrs.record(&mut fields);
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push((span.name().to_owned(), fields.0));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut fields = FieldVisitor::default();
        event.record(&mut fields);
        self.events.lock().expect("lock poisoned").push(fields.0);
    }
}

fn install() -> (Collector, tracing::subscriber::DefaultGuard) {
    let collector = Collector::default();
    let subscriber = tracing_subscriber::registry().with(collector.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (collector, guard)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn verification_span_carries_tenant_id() {
    let (collector, _guard) = install();
    let key = TestKey::tenant_a();
    let harness = Harness::new(&[("acmecorp", &key)]);
    let token = sign_token(&key, &id_token_claims(&issuer_for("acmecorp"), "acmecorp"));

    harness.verifier.authenticate_with_claim(&token).await.expect("verified");

    let spans = collector.spans.lock().expect("lock poisoned");
    assert!(
        spans.iter().any(|(name, fields)| name == "verify_for_tenant"
            && fields.get("tenant_id").map(String::as_str) == Some("acmecorp")),
        "expected a 'verify_for_tenant' span with tenant_id, got: {spans:?}"
    );
    assert!(
        spans.iter().any(|(name, fields)| name == "get_key"
            && fields.get("issuer").is_some_and(|i| i.contains("us-east-1_acmecorp"))),
        "expected a 'get_key' span with the issuer, got: {spans:?}"
    );
}

#[tokio::test]
async fn credential_is_not_recorded() {
    let (collector, _guard) = install();
    let key = TestKey::tenant_a();
    let harness = Harness::new(&[("acmecorp", &key)]);
    let token = sign_token(&key, &id_token_claims(&issuer_for("acmecorp"), "acmecorp"));

    harness.verifier.authenticate_with_claim(&token).await.expect("verified");

    let spans = collector.spans.lock().expect("lock poisoned");
    let events = collector.events.lock().expect("lock poisoned");
    let leaked = spans.iter().map(|(_, f)| f).chain(events.iter()).any(|fields| {
        fields.values().any(|value| value.contains(&token))
    });
    assert!(!leaked, "the bearer token must not appear in spans or events");
}

#[tokio::test]
async fn rejection_logs_reason() {
    let (collector, _guard) = install();
    let key = TestKey::tenant_a();
    let harness = Harness::new(&[("acmecorp", &key)]);
    let mut claims = id_token_claims(&issuer_for("acmecorp"), "acmecorp");
    claims["token_use"] = serde_json::json!("access");
    let token = sign_token(&key, &claims);

    let _ = harness.verifier.authenticate_with_claim(&token).await;

    let events = collector.events.lock().expect("lock poisoned");
    assert!(
        events.iter().any(|fields| fields.get("reason").map(String::as_str) == Some("token_type")),
        "expected a rejection event with reason=token_type, got: {events:?}"
    );
}

#[tokio::test]
async fn invalidate_emits_audit_event() {
    let (collector, _guard) = install();
    let harness = Harness::new(&[("acmecorp", &TestKey::tenant_a())]);

    harness.verifier.key_cache().invalidate(&issuer_for("acmecorp")).await;
    harness.verifier.key_cache().clear_all().await;

    let events = collector.events.lock().expect("lock poisoned");
    let actions: Vec<_> =
        events.iter().filter_map(|fields| fields.get("audit.action").cloned()).collect();
    assert_eq!(actions, vec!["invalidate_key_set".to_owned(), "clear_key_sets".to_owned()]);
}
