//! End-to-end pump behavior against scripted in-memory adapters.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use docpump::{
    Batch, CheckpointRecord, CheckpointStatus, Document, DocumentSink, DocumentSource, ErrorEvent,
    EventSink, Mode, Pump, PumpError, Result, RunConfig, TransformRegistry,
};

fn make_docs(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| {
            [
                ("id".to_string(), json!(i)),
                ("value".to_string(), json!(format!("doc-{}", i))),
            ]
            .into_iter()
            .collect()
        })
        .collect()
}

/// Fixed document set served page by page; optionally fails at one offset.
struct MemorySource {
    docs: Vec<Document>,
    calls: Mutex<Vec<(usize, u64)>>,
    fail_at: Option<u64>,
}

impl MemorySource {
    fn new(count: usize) -> Self {
        Self {
            docs: make_docs(count),
            calls: Mutex::new(Vec::new()),
            fail_at: None,
        }
    }

    fn failing_at(count: usize, offset: u64) -> Self {
        Self {
            fail_at: Some(offset),
            ..Self::new(count)
        }
    }

    fn calls(&self) -> Vec<(usize, u64)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn get(&self, limit: usize, offset: u64) -> Result<Batch> {
        self.calls.lock().unwrap().push((limit, offset));
        if self.fail_at == Some(offset) {
            return Err(PumpError::fetch(offset, "synthetic fetch failure"));
        }
        let start = offset as usize;
        if start >= self.docs.len() {
            return Ok(Batch::new());
        }
        let end = (start + limit).min(self.docs.len());
        Ok(self.docs[start..end].to_vec())
    }
}

/// Records everything written; optionally slow, lossy or failing.
#[derive(Default)]
struct RecordingSink {
    begun: Mutex<Vec<u64>>,
    docs: Mutex<Vec<Document>>,
    fail_offsets: HashSet<u64>,
    delay: Duration,
    reported_count: Option<u64>,
}

impl RecordingSink {
    fn begun(&self) -> Vec<u64> {
        self.begun.lock().unwrap().clone()
    }

    fn docs(&self) -> Vec<Document> {
        self.docs.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentSink for RecordingSink {
    async fn set(&self, batch: Batch, _limit: usize, offset: u64) -> Result<u64> {
        self.begun.lock().unwrap().push(offset);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_offsets.contains(&offset) {
            return Err(PumpError::write(offset, "synthetic write failure"));
        }
        let count = self.reported_count.unwrap_or(batch.len() as u64);
        self.docs.lock().unwrap().extend(batch);
        Ok(count)
    }
}

/// Event sink capturing messages for assertions.
#[derive(Default)]
struct CollectingSink {
    messages: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl EventSink for CollectingSink {
    fn log(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }

    fn error(&self, event: &ErrorEvent<'_>) {
        let text = match event {
            ErrorEvent::Failure(err) => err.to_string(),
            ErrorEvent::Validation(errors) => errors.join("; "),
        };
        self.errors.lock().unwrap().push(text);
    }
}

struct Fixture {
    config: RunConfig,
    _dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let mut config = RunConfig::new(Mode::Backup, "http://localhost:9200/orders", "orders.json");
    config.limit = 2;
    config.checkpoint_path = dir.path().join("checkpoint.json");
    config.to_log = false;
    Fixture { config, _dir: dir }
}

fn load_checkpoint(config: &RunConfig) -> CheckpointRecord {
    CheckpointRecord::load(&config.checkpoint_path).unwrap()
}

#[tokio::test]
async fn pagination_covers_source_then_sees_one_empty_page() {
    let fx = fixture();
    let source = Arc::new(MemorySource::new(5));
    let sink = Arc::new(RecordingSink::default());

    let report = Pump::new(fx.config.clone(), source.clone(), sink.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    // Offsets advance by fetched batch length: pages of 2, 2 and 1, then
    // one empty fetch at the exhaustion point.
    assert_eq!(source.calls(), vec![(2, 0), (2, 2), (2, 4), (2, 5)]);
    assert_eq!(report.total_writes, 5);
    assert_eq!(report.pages, 3);
    assert_eq!(sink.docs().len(), 5);

    let checkpoint = load_checkpoint(&fx.config);
    assert_eq!(checkpoint.status, CheckpointStatus::Complete);
    assert_eq!(checkpoint.offset, 5);
    assert_eq!(checkpoint.index_name, "orders");
}

#[tokio::test]
async fn empty_source_completes_with_zero_writes() {
    let fx = fixture();
    let source = Arc::new(MemorySource::new(0));
    let sink = Arc::new(RecordingSink::default());

    let report = Pump::new(fx.config.clone(), source.clone(), sink)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(source.calls(), vec![(2, 0)]);
    assert_eq!(report.total_writes, 0);
    assert_eq!(report.pages, 0);
    assert_eq!(load_checkpoint(&fx.config).offset, 0);
}

#[tokio::test]
async fn total_writes_exact_under_concurrent_overlap() {
    let mut fx = fixture();
    fx.config.limit = 3;
    fx.config.concurrency = 4;
    let source = Arc::new(MemorySource::new(10));
    let sink = Arc::new(RecordingSink {
        delay: Duration::from_millis(5),
        ..RecordingSink::default()
    });

    let report = Pump::new(fx.config.clone(), source, sink.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.total_writes, 10);
    assert_eq!(sink.docs().len(), 10);
    assert_eq!(load_checkpoint(&fx.config).offset, 10);
}

#[tokio::test]
async fn concurrency_one_writes_in_fetch_order() {
    let mut fx = fixture();
    fx.config.concurrency = 1;
    let source = Arc::new(MemorySource::new(7));
    let sink = Arc::new(RecordingSink {
        delay: Duration::from_millis(3),
        ..RecordingSink::default()
    });

    Pump::new(fx.config, source, sink.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(sink.begun(), vec![0, 2, 4, 6]);
}

#[tokio::test]
async fn sink_reported_count_is_accumulated_not_batch_length() {
    let fx = fixture();
    let source = Arc::new(MemorySource::new(5));
    // Sink dedupes: every write reports a single persisted document.
    let sink = Arc::new(RecordingSink {
        reported_count: Some(1),
        ..RecordingSink::default()
    });

    let report = Pump::new(fx.config.clone(), source.clone(), sink)
        .unwrap()
        .run()
        .await
        .unwrap();

    // Offset still advances by fetched length, not by reported writes.
    assert_eq!(source.calls(), vec![(2, 0), (2, 2), (2, 4), (2, 5)]);
    assert_eq!(report.total_writes, 3);
    assert_eq!(load_checkpoint(&fx.config).offset, 3);
}

#[tokio::test]
async fn tolerated_write_failure_contributes_zero_and_run_continues() {
    let mut fx = fixture();
    fx.config.ignore_errors = true;
    let source = Arc::new(MemorySource::new(5));
    let sink = Arc::new(RecordingSink {
        fail_offsets: HashSet::from([2]),
        ..RecordingSink::default()
    });

    let report = Pump::new(fx.config.clone(), source.clone(), sink.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    // All pages processed despite the failed middle write.
    assert_eq!(source.calls(), vec![(2, 0), (2, 2), (2, 4), (2, 5)]);
    assert_eq!(report.total_writes, 3);
    assert_eq!(sink.docs().len(), 3);
    assert_eq!(load_checkpoint(&fx.config).status, CheckpointStatus::Complete);
}

#[tokio::test]
async fn write_failure_is_fatal_without_ignore_errors() {
    let fx = fixture();
    let source = Arc::new(MemorySource::new(5));
    let sink = Arc::new(RecordingSink {
        fail_offsets: HashSet::from([2]),
        ..RecordingSink::default()
    });

    let err = Pump::new(fx.config.clone(), source, sink)
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, PumpError::Write { offset: 2, .. }));
    assert_eq!(load_checkpoint(&fx.config).status, CheckpointStatus::Error);
}

#[tokio::test]
async fn fetch_failure_is_fatal_without_ignore_errors() {
    let fx = fixture();
    let source = Arc::new(MemorySource::failing_at(5, 2));
    let sink = Arc::new(RecordingSink::default());

    let err = Pump::new(fx.config.clone(), source.clone(), sink)
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, PumpError::Fetch { offset: 2, .. }));
    assert_eq!(source.calls(), vec![(2, 0), (2, 2)]);
    assert_eq!(load_checkpoint(&fx.config).status, CheckpointStatus::Error);
}

#[tokio::test]
async fn tolerated_fetch_failure_acts_as_empty_page_without_advancing() {
    let mut fx = fixture();
    fx.config.ignore_errors = true;
    let source = Arc::new(MemorySource::failing_at(5, 2));
    let sink = Arc::new(RecordingSink::default());

    let report = Pump::new(fx.config.clone(), source.clone(), sink.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    // The failed fetch never advanced the offset and the first page's
    // write still settled before finalization.
    assert_eq!(source.calls(), vec![(2, 0), (2, 2)]);
    assert_eq!(report.total_writes, 2);
    assert_eq!(sink.docs().len(), 2);

    let checkpoint = load_checkpoint(&fx.config);
    assert_eq!(checkpoint.status, CheckpointStatus::Complete);
    assert_eq!(checkpoint.offset, 2);
}

#[tokio::test]
async fn modifier_failure_is_fatal_even_with_ignore_errors() {
    let mut fx = fixture();
    fx.config.ignore_errors = true;
    // `id` is a scalar: descending through it is a defect in the script.
    fx.config.transform = vec!["set id.nested = 1".to_string()];
    let source = Arc::new(MemorySource::new(5));
    let sink = Arc::new(RecordingSink::default());

    let err = Pump::new(fx.config.clone(), source, sink.clone())
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, PumpError::Transform(_)));
    assert!(sink.docs().is_empty());
    assert_eq!(load_checkpoint(&fx.config).status, CheckpointStatus::Error);
}

#[tokio::test]
async fn modifiers_apply_in_order_before_writes() {
    let mut fx = fixture();
    fx.config.transform = vec![
        "set audit.stage = \"first\"".to_string(),
        "copy audit.stage audit.previous; set audit.stage = \"second\"".to_string(),
    ];
    let source = Arc::new(MemorySource::new(3));
    let sink = Arc::new(RecordingSink::default());

    Pump::new(fx.config, source, sink.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    for doc in sink.docs() {
        // The second modifier observed the first one's effect.
        let audit = doc.get("audit").and_then(|v| v.as_object()).unwrap();
        assert_eq!(audit["previous"], json!("first"));
        assert_eq!(audit["stage"], json!("second"));
    }
}

#[tokio::test]
async fn plugin_transform_receives_query_params() {
    let mut fx = fixture();
    fx.config.transform = vec!["@stamp?label=from+backup".to_string()];
    let mut registry = TransformRegistry::new();
    registry.register("stamp", |doc: &mut Document, params: &std::collections::BTreeMap<String, String>| {
        doc.insert("label".to_string(), json!(params["label"].clone()));
        Ok(())
    });

    let source = Arc::new(MemorySource::new(2));
    let sink = Arc::new(RecordingSink::default());

    Pump::with_registry(fx.config, source, sink.clone(), &registry)
        .unwrap()
        .run()
        .await
        .unwrap();

    for doc in sink.docs() {
        assert_eq!(doc.get("label"), Some(&json!("from backup")));
    }
}

#[tokio::test]
async fn validation_fails_before_any_io() {
    let mut fx = fixture();
    fx.config.input = String::new();

    let source = Arc::new(MemorySource::new(5));
    let sink = Arc::new(RecordingSink::default());

    let err = Pump::new(fx.config, source.clone(), sink).unwrap_err();
    match err {
        PumpError::Validation(errors) => assert_eq!(errors, ["`input` is a required option"]),
        other => panic!("expected validation error, got {other}"),
    }
    assert!(source.calls().is_empty());
}

#[tokio::test]
async fn unregistered_plugin_fails_at_construction() {
    let mut fx = fixture();
    fx.config.transform = vec!["@nope".to_string()];
    let source = Arc::new(MemorySource::new(1));
    let sink = Arc::new(RecordingSink::default());

    let err = Pump::new(fx.config, source, sink).unwrap_err();
    assert!(matches!(err, PumpError::Config(_)));
}

#[tokio::test]
async fn cancellation_stops_fetching_and_checkpoints() {
    let fx = fixture();
    let source = Arc::new(MemorySource::new(100));
    let sink = Arc::new(RecordingSink::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Pump::new(fx.config.clone(), source.clone(), sink)
        .unwrap()
        .with_cancellation(cancel)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, PumpError::Cancelled));
    assert!(source.calls().is_empty());
    assert_eq!(load_checkpoint(&fx.config).status, CheckpointStatus::Error);
}

#[tokio::test]
async fn event_sink_observes_progress_and_totals() {
    let fx = fixture();
    let source = Arc::new(MemorySource::new(5));
    let sink = Arc::new(RecordingSink::default());
    let events = Arc::new(CollectingSink::default());

    Pump::new(fx.config, source, sink)
        .unwrap()
        .with_event_sink(events.clone())
        .run()
        .await
        .unwrap();

    let messages = events.messages.lock().unwrap().clone();
    assert!(messages.iter().any(|m| m == "starting dump"));
    assert!(messages.iter().any(|m| m.contains("got 2 objects")));
    assert!(messages.iter().any(|m| m == "Total Writes: 5"));
    assert!(messages.iter().any(|m| m == "dump complete"));
    assert!(events.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn event_sink_observes_fatal_failure() {
    let fx = fixture();
    let source = Arc::new(MemorySource::failing_at(5, 0));
    let sink = Arc::new(RecordingSink::default());
    let events = Arc::new(CollectingSink::default());

    let err = Pump::new(fx.config, source, sink)
        .unwrap()
        .with_event_sink(events.clone())
        .run()
        .await
        .unwrap_err();

    let errors = events.errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0], err.to_string());
}

#[tokio::test]
async fn checkpoint_write_failure_never_fails_the_run() {
    let mut fx = fixture();
    fx.config.checkpoint_path = fx._dir.path().join("missing-dir").join("checkpoint.json");
    let source = Arc::new(MemorySource::new(5));
    let sink = Arc::new(RecordingSink::default());

    let report = Pump::new(fx.config, source, sink)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.total_writes, 5);
}

#[tokio::test]
async fn default_tracing_sink_smoke() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut fx = fixture();
    fx.config.to_log = true;
    let source = Arc::new(MemorySource::new(3));
    let sink = Arc::new(RecordingSink::default());

    let report = Pump::new(fx.config, source, sink)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(report.total_writes, 3);
}

#[tokio::test]
async fn starting_offset_is_honored() {
    let mut fx = fixture();
    fx.config.offset = 4;
    let source = Arc::new(MemorySource::new(5));
    let sink = Arc::new(RecordingSink::default());

    let report = Pump::new(fx.config, source.clone(), sink)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(source.calls(), vec![(2, 4), (2, 5)]);
    assert_eq!(report.total_writes, 1);
}
