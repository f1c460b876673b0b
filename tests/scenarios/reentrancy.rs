//! Test: Reentrancy - only one discovery/execution cycle runs at a time

use crate::helpers::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voxchain::agent::{Model, ModelRegistry};
use voxchain::core::{state::lock_state, PipelineError};
use voxchain::execution::{ExecutionEvent, PipelineExecutor};

fn slow_harness() -> Harness {
    let store = seeded_store();
    store.insert("inbox/audio/a.m4a", "first");
    store.insert("inbox/audio/b.m4a", "second");
    let whisper = MockModel::new(["One", "Two"]).with_delay(Duration::from_millis(50));
    let gpt = MockModel::new(["Note one.", "Note two."]);
    Harness::new(voice_config(), store, whisper, gpt)
}

#[tokio::test]
async fn test_concurrent_call_is_rejected() {
    let h = slow_harness();

    let (first, second) = tokio::join!(h.engine.process_next_file(), h.engine.process_next_file());

    let results = [first, second];
    let completed = results.iter().filter(|r| r.is_ok()).count();
    let busy = results
        .iter()
        .filter(|r| matches!(r, Err(PipelineError::AlreadyProcessing)))
        .count();
    assert_eq!(completed, 1);
    assert_eq!(busy, 1);
    assert_eq!(h.whisper.calls().len(), 1);
    assert!(h.store.contents("inbox/audio/b.m4a").is_some());
}

#[tokio::test]
async fn test_state_is_released_after_cycle() {
    let h = slow_harness();
    assert!(lock_state(&h.state).last_execution_timestamp.is_none());

    h.engine.process_next_file().await.unwrap();

    {
        let state = lock_state(&h.state);
        assert!(!state.processing);
        assert!(state.active_files.is_empty());
        assert!(state.last_execution_timestamp.is_some());
    }

    // Released, so the next call goes through
    let next = h.engine.process_next_file().await.unwrap();
    assert_eq!(next.source.path, "inbox/audio/b.m4a");
}

/// Two engines sharing one state handle exclude each other too
#[tokio::test]
async fn test_shared_state_spans_engines() {
    let h = slow_harness();
    let models = ModelRegistry::new()
        .with("whisper", Model::Transcription(Arc::new(h.whisper.clone())))
        .with("gpt", Model::Chat(Arc::new(h.gpt.clone())));
    let other =
        PipelineExecutor::new(voice_config(), Arc::new(h.store.clone()), models, h.state.clone());

    let (first, second) = tokio::join!(h.engine.process_next_file(), other.process_next_file());

    assert!(first.is_ok());
    assert!(matches!(second, Err(PipelineError::AlreadyProcessing)));
    assert!(!lock_state(&h.state).processing);
}

/// While a chain runs, its source and every routed output are marked active
#[tokio::test]
async fn test_active_files_visible_during_chain() {
    let h = slow_harness();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let state = h.state.clone();
    h.engine.add_event_handler(move |event| {
        if let ExecutionEvent::StepStarted { step_id, path, .. } = event {
            let active = lock_state(&state).is_active(&path);
            sink.lock().unwrap().push((step_id, active));
        }
    });

    h.engine.process_next_file().await.unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![("transcribe".to_string(), true), ("classify".to_string(), true)]
    );
    assert!(!lock_state(&h.state).is_active("inbox/audio/a.m4a"));
}
