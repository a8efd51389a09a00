//! End-to-end queue tests against a real SQLite store: batch submission with
//! skip-existing filtering, progress events, and invariant checks observed
//! from the outside.

use async_trait::async_trait;
use scribe_core::config::{DatabaseConfig, QueueConfig};
use scribe_core::constants::DocumentKind;
use scribe_core::database::{self, migrations, RecordingStore};
use scribe_core::error::{Result, ScribeError};
use scribe_core::events::{EventDispatcher, ProcessingEvent};
use scribe_core::models::NewRecording;
use scribe_core::queue::{
    BatchOptions, BatchRecordingRequest, BatchStatus, ProcessOptions, ProcessingQueue,
    TaskExecutor, TaskOutput, TaskSpec,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Deterministic executor: fails for the configured recording ids, succeeds
/// otherwise. Keeps the store untouched; storage writes are covered by the
/// pipeline and database tests.
struct ScriptedExecutor {
    fail: HashSet<i64>,
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, spec: &TaskSpec) -> Result<TaskOutput> {
        if self.fail.contains(&spec.recording_id) {
            return Err(ScribeError::ServiceUnavailable {
                provider: "stt".to_string(),
                message: "upstream 503".to_string(),
            });
        }
        Ok(TaskOutput {
            transcript: Some("ok".to_string()),
            documents: Default::default(),
        })
    }
}

struct Harness {
    store: RecordingStore,
    queue: ProcessingQueue,
    events: Arc<parking_lot::Mutex<Vec<ProcessingEvent>>>,
    _dir: tempfile::TempDir,
}

async fn harness(fail: &[i64]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db_config = DatabaseConfig {
        path: "scribe.db".to_string(),
        max_connections: 2,
    };
    let pool = database::connect(&db_config, &dir.path().join("scribe.db"))
        .await
        .unwrap();
    migrations::run_migrations(&pool).await.unwrap();
    let store = RecordingStore::new(pool);

    let (sender, mut dispatcher) = EventDispatcher::channel();
    let events: Arc<parking_lot::Mutex<Vec<ProcessingEvent>>> =
        Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    dispatcher.subscribe(move |event| {
        sink.lock().push(event.clone());
    });
    tokio::spawn(dispatcher.run());

    let queue = ProcessingQueue::new(
        QueueConfig {
            max_concurrency: 2,
            max_batch_size: 50,
        },
        Arc::new(ScriptedExecutor {
            fail: fail.iter().copied().collect(),
        }),
        Arc::new(store.clone()),
        sender,
    );
    queue.start();

    Harness {
        store,
        queue,
        events,
        _dir: dir,
    }
}

async fn seed_recordings(store: &RecordingStore, count: usize) -> Vec<i64> {
    let mut ids = Vec::new();
    for index in 0..count {
        let id = store
            .create(&NewRecording {
                filename: format!("visit_{index:03}.wav"),
                patient_name: None,
                duration_seconds: Some(30.0),
            })
            .await
            .unwrap();
        ids.push(id);
    }
    ids
}

fn batch_requests(ids: &[i64]) -> Vec<BatchRecordingRequest> {
    ids.iter()
        .map(|id| BatchRecordingRequest {
            recording_id: *id,
            file_path: format!("visit_{id:03}.wav"),
        })
        .collect()
}

fn soap_options() -> BatchOptions {
    BatchOptions {
        process: ProcessOptions {
            generate_soap: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn wait_for_terminal(harness: &Harness, batch_id: uuid::Uuid) {
    for _ in 0..500 {
        if harness
            .queue
            .get_batch(batch_id)
            .is_some_and(|b| b.status.is_terminal())
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("batch did not reach a terminal state");
}

#[tokio::test]
async fn batch_with_skip_existing_against_real_store() {
    let harness = harness(&[]).await;
    let ids = seed_recordings(&harness.store, 3).await;

    // Recording #2 already has a SOAP note on disk.
    harness
        .store
        .update_document(ids[1], DocumentKind::SoapNote, "S: follow-up")
        .await
        .unwrap();

    let mut options = soap_options();
    options.skip_existing = true;

    let batch_id = harness
        .queue
        .add_batch_recordings(batch_requests(&ids), options)
        .await
        .unwrap();

    let batch = harness.queue.get_batch(batch_id).unwrap();
    assert_eq!(batch.total, 2);
    assert_eq!(batch.skipped_recordings, vec![ids[1]]);

    wait_for_terminal(&harness, batch_id).await;

    let batch = harness.queue.get_batch(batch_id).unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.completed, 2);
    assert_eq!(batch.failed, 0);
    assert_eq!(batch.summary(), "2 successful, 0 failed");
}

#[tokio::test]
async fn progress_events_preserve_batch_invariant() {
    let harness = harness(&[2]).await;
    let ids = seed_recordings(&harness.store, 4).await;

    let batch_id = harness
        .queue
        .add_batch_recordings(batch_requests(&ids), soap_options())
        .await
        .unwrap();

    wait_for_terminal(&harness, batch_id).await;

    // Give the dispatcher a beat to drain the tail of the channel.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let events = harness.events.lock();
    let mut progress_seen = 0;
    for event in events.iter() {
        if let ProcessingEvent::BatchProgress {
            total,
            completed,
            failed,
            pending,
            ..
        } = event
        {
            assert_eq!(completed + failed + pending, *total);
            progress_seen += 1;
        }
    }
    assert!(progress_seen >= 4); // initial + one per terminal task

    let completed_event = events.iter().find_map(|event| match event {
        ProcessingEvent::BatchCompleted {
            status,
            completed,
            failed,
            ..
        } => Some((*status, *completed, *failed)),
        _ => None,
    });
    let (status, completed, failed) = completed_event.expect("no BatchCompleted event");
    assert_eq!(status, BatchStatus::CompletedWithErrors);
    assert_eq!(completed, 3);
    assert_eq!(failed, 1);
}

#[tokio::test]
async fn failed_tasks_surface_formatted_errors() {
    let harness = harness(&[1, 2]).await;
    let ids = seed_recordings(&harness.store, 2).await;

    let batch_id = harness
        .queue
        .add_batch_recordings(batch_requests(&ids), soap_options())
        .await
        .unwrap();
    wait_for_terminal(&harness, batch_id).await;

    let batch = harness.queue.get_batch(batch_id).unwrap();
    assert_eq!(batch.errors.len(), 2);
    for error in &batch.errors {
        assert!(error.starts_with("[Error: Service Unavailable]"));
    }
    assert_eq!(batch.summary(), "0 successful, 2 failed");
}
