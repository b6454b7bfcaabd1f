use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use viewforge_engine::{
    BulkFetch, EnrichmentFunction, FillerOptions, FillerResolver, FunctionRegistry, GroupFailureReason,
    PendingEnrichments, ResultKey, ViewError, ViewResolver,
};
use viewforge_registry::{ConfigurationError, FieldBinding, KeyExtractor, ViewDefinition, ViewRegistry};
use viewforge_types::{Entity, EntityRecord, EntityType, FieldKind, ViewValue};

static POST: EntityType = EntityType::new("Post");

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn registry() -> Arc<ViewRegistry> {
    let registry = ViewRegistry::builder()
        .register(
            ViewDefinition::new("PostView")
                .field(FieldBinding::value("id"))
                .field(FieldBinding::value("author").source("authorId").enrich("users"))
                .field(FieldBinding::value("stats").source("id").enrich("stats"))
                .field(
                    FieldBinding::new("tags", FieldKind::list(FieldKind::data()))
                        .source("tagIds")
                        .enrich("tags"),
                )
                .field(
                    FieldBinding::value("editor")
                        .source("editorId")
                        .enrich_with("users", KeyExtractor::custom(|value| value.to_data().filter(|id| id.as_i64() != Some(0))))
                        .adapter(|value| {
                            Ok(match value {
                                ViewValue::Data(user) => ViewValue::Data(user["name"].clone()),
                                other => other,
                            })
                        }),
                ),
        )
        .build()
        .expect("registry");
    Arc::new(registry)
}

fn post(id: i64, author: i64) -> Arc<dyn Entity> {
    Arc::new(EntityRecord::new(&POST).with("id", id).with("authorId", author))
}

fn users(calls: Arc<AtomicUsize>, known: &'static [i64]) -> EnrichmentFunction {
    EnrichmentFunction::from_fn("users", ResultKey::field("id"), move |keys| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(keys
            .into_iter()
            .filter(|key| key.as_i64().is_some_and(|id| known.contains(&id)))
            .map(|id| json!({ "id": id, "name": format!("user-{id}") }))
            .collect())
    })
}

fn stats() -> EnrichmentFunction {
    EnrichmentFunction::from_fn("stats", ResultKey::field("id"), |keys| {
        Ok(keys.into_iter().map(|id| json!({ "id": id, "views": 0 })).collect())
    })
}

struct FailingStats;

#[async_trait]
impl BulkFetch for FailingStats {
    async fn fetch(&self, _keys: Vec<Value>) -> anyhow::Result<Vec<Value>> {
        anyhow::bail!("stats backend unavailable")
    }
}

struct SlowStats;

#[async_trait]
impl BulkFetch for SlowStats {
    async fn fetch(&self, keys: Vec<Value>) -> anyhow::Result<Vec<Value>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(keys.into_iter().map(|id| json!({ "id": id })).collect())
    }
}

#[tokio::test]
async fn missing_results_leave_fields_absent() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let functions = FunctionRegistry::new()
        .with(users(Arc::clone(&calls), &[1, 3]))
        .and_then(|functions| functions.with(stats()))
        .expect("functions");
    let resolver = ViewResolver::with_defaults(registry());

    let entities = vec![post(10, 1), post(20, 2), post(30, 3)];
    let hydrated = resolver
        .resolve_hydrated("PostView", &entities, &functions, CancellationToken::new())
        .await
        .expect("hydrate");

    assert_eq!(calls.load(Ordering::SeqCst), 1, "one bulk call per function");
    let authors: Vec<_> = hydrated.views.iter().map(|view| view.data("author")).collect();
    assert_eq!(
        authors,
        vec![
            Some(json!({ "id": 1, "name": "user-1" })),
            None,
            Some(json!({ "id": 3, "name": "user-3" })),
        ]
    );
    let group = hydrated.report.group("users").expect("users group");
    assert_eq!((group.filled, group.missing), (2, 1));
    assert!(hydrated.report.is_complete());
}

#[tokio::test]
async fn failing_group_does_not_affect_others() {
    init_tracing();
    let registry = registry();
    let functions = FunctionRegistry::new()
        .with(users(Arc::new(AtomicUsize::new(0)), &[1, 2]))
        .expect("users")
        .with(EnrichmentFunction::new("stats", ResultKey::field("id"), FailingStats))
        .expect("stats");

    let (views, pending) = ViewResolver::with_defaults(registry)
        .resolve_entities("PostView", &[post(1, 1), post(2, 2)])
        .expect("resolve")
        .into_parts();
    let report = FillerResolver::default()
        .fill(pending, &functions, CancellationToken::new())
        .await
        .expect("fill");

    let failures: Vec<_> = report.failed_groups().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].function, "stats");
    assert_eq!(failures[0].reason, GroupFailureReason::Fetch("stats backend unavailable".to_string()));
    assert_eq!(failures[0].unfilled, 2);
    for view in &views {
        assert!(!view.contains("stats"));
        assert!(view.contains("author"));
    }
}

#[tokio::test]
async fn slow_group_times_out_alone() {
    init_tracing();
    let functions = FunctionRegistry::new()
        .with(users(Arc::new(AtomicUsize::new(0)), &[1]))
        .expect("users")
        .with(EnrichmentFunction::new("stats", ResultKey::field("id"), SlowStats))
        .expect("stats");
    let resolver = ViewResolver::with_defaults(registry()).with_filler_options(FillerOptions {
        group_timeout: Some(Duration::from_millis(50)),
        ..FillerOptions::default()
    });

    let hydrated = resolver
        .resolve_hydrated("PostView", &[post(1, 1)], &functions, CancellationToken::new())
        .await
        .expect("hydrate");

    let failure = hydrated.report.failed_groups().next().expect("timeout reported");
    assert_eq!(failure.reason, GroupFailureReason::TimedOut(Duration::from_millis(50)));
    assert!(hydrated.views[0].contains("author"));
    assert!(!hydrated.views[0].contains("stats"));
}

#[tokio::test]
async fn pending_from_several_calls_fill_together() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);
    let functions = FunctionRegistry::new()
        .with(EnrichmentFunction::from_fn("users", ResultKey::field("id"), move |keys| {
            recorded.lock().expect("lock").push(keys.len());
            Ok(keys.into_iter().map(|id| json!({ "id": id })).collect())
        }))
        .and_then(|functions| functions.with(stats()))
        .expect("functions");
    let resolver = ViewResolver::with_defaults(registry());

    let mut pending = PendingEnrichments::new();
    let mut views = Vec::new();
    for batch in [vec![post(1, 1), post(2, 2)], vec![post(3, 2), post(4, 4)]] {
        let (resolved, batch_pending) = resolver.resolve_entities("PostView", &batch).expect("resolve").into_parts();
        views.extend(resolved);
        pending.extend(batch_pending);
    }

    let report = resolver.filler().fill(pending, &functions, CancellationToken::new()).await.expect("fill");
    assert_eq!(*seen.lock().expect("lock"), vec![3], "keys 1, 2 and 4 sent once");
    assert_eq!(report.group("users").map(|group| group.filled), Some(4));
    assert_eq!(views[2].data("author"), Some(json!({ "id": 2 })));
}

#[tokio::test]
async fn collection_keys_fill_collections() {
    let functions = FunctionRegistry::new()
        .with(EnrichmentFunction::from_fn("tags", ResultKey::field("tag"), |keys| {
            Ok(keys
                .into_iter()
                .map(|tag| {
                    let label = tag.as_str().map(str::to_uppercase);
                    json!({ "tag": tag, "label": label })
                })
                .collect())
        }))
        .and_then(|functions| functions.with(stats()))
        .expect("functions");
    let entity: Arc<dyn Entity> = Arc::new(EntityRecord::new(&POST).with("id", 1i64).with("tagIds", json!(["rust", "async"])));
    let (views, pending) = ViewResolver::with_defaults(registry())
        .resolve_entities("PostView", &[entity])
        .expect("resolve")
        .into_parts();

    FillerResolver::default()
        .fill(pending, &functions, CancellationToken::new())
        .await
        .expect("fill");
    assert_eq!(
        views[0].to_json()["tags"],
        json!([{ "tag": "rust", "label": "RUST" }, { "tag": "async", "label": "ASYNC" }])
    );
}

#[tokio::test]
async fn custom_keys_and_adapters_apply_to_results() {
    let functions = FunctionRegistry::new()
        .with(users(Arc::new(AtomicUsize::new(0)), &[5, 6]))
        .and_then(|functions| functions.with(stats()))
        .expect("functions");
    let with_editor: Arc<dyn Entity> = Arc::new(EntityRecord::new(&POST).with("id", 1i64).with("editorId", 6i64));
    let zero_editor: Arc<dyn Entity> = Arc::new(EntityRecord::new(&POST).with("id", 2i64).with("editorId", 0i64));
    let resolved = ViewResolver::with_defaults(registry())
        .resolve_entities("PostView", &[with_editor, zero_editor])
        .expect("resolve");
    let editors = resolved.pending.iter().filter(|pending| pending.binding.name == "editor").count();
    assert_eq!(editors, 1, "a zero editor id yields no key");

    let (views, pending) = resolved.into_parts();
    FillerResolver::default()
        .fill(pending, &functions, CancellationToken::new())
        .await
        .expect("fill");
    assert_eq!(views[0].data("editor"), Some(json!("user-6")));
    assert!(!views[1].contains("editor"));
}

#[tokio::test]
async fn unregistered_function_is_reported_before_fetching() {
    let calls = Arc::new(AtomicUsize::new(0));
    let functions = FunctionRegistry::new().with(users(Arc::clone(&calls), &[1])).expect("functions");
    let error = ViewResolver::with_defaults(registry())
        .resolve_hydrated("PostView", &[post(1, 1)], &functions, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(error, ViewError::Configuration(ConfigurationError::UnknownFunction { ref function, .. }) if function == "stats"),
        "unexpected error: {error}"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
