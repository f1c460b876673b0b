//! Test: Failure handling - where a chain stops and what it leaves behind

use crate::helpers::*;
use std::collections::HashSet;
use voxchain::agent::AgentError;
use voxchain::core::{PipelineConfiguration, StepPhase, StepStatus};
use voxchain::execution::{ChainStatus, ExecutionEvent};

fn with_audio(name: &str) -> voxchain::storage::MemoryFileStore {
    let store = seeded_store();
    store.insert(&format!("inbox/audio/{}", name), vec![1u8; 8]);
    store
}

#[tokio::test]
async fn test_model_failure_stops_chain_and_keeps_input() {
    let h = Harness::new(
        voice_config(),
        with_audio("standup.m4a"),
        MockModel::new(["Transcript"]),
        MockModel::failing(AgentError::Auth("Invalid API key".to_string())),
    );

    let outcome = h.engine.process_next_file().await.unwrap();

    assert_eq!(outcome.status, ChainStatus::Failed);
    assert!(!outcome.is_success());
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].status, StepStatus::Completed);

    let failed: Vec<_> = outcome.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].step_id, "classify");
    assert_eq!(failed[0].failed_phase, Some(StepPhase::Dispatch));
    assert!(failed[0].error.as_deref().unwrap().contains("Invalid API key"));

    // The finished hop is archived, the failed one is left where it was
    assert!(h.store.contents("archive/transcribe/standup.m4a").is_some());
    assert!(h.store.contents("inbox/transcripts/standup.md").is_some());
    assert!(h.store.contents("archive/classify/standup.md").is_none());

    assert!(h.events().iter().any(|e| matches!(
        e,
        ExecutionEvent::StepFailed { step_id, phase: StepPhase::Dispatch, .. }
            if step_id == "classify"
    )));
}

#[tokio::test]
async fn test_missing_prompt_fails_before_dispatch() {
    let store = voxchain::storage::MemoryFileStore::new();
    store.insert("inbox/audio/standup.m4a", vec![1u8; 8]);
    let h = Harness::new(
        voice_config(),
        store,
        MockModel::new(["Transcript"]),
        MockModel::new(["unused"]),
    );

    let outcome = h.engine.process_next_file().await.unwrap();

    let failed = outcome.failures().next().unwrap();
    assert_eq!(failed.step_id, "classify");
    assert_eq!(failed.failed_phase, Some(StepPhase::ReadInput));
    assert!(h.gpt.calls().is_empty());
}

#[tokio::test]
async fn test_strict_protocol_rejects_bad_frontmatter() {
    let mut config = voice_config();
    config.settings.strict_protocol = true;
    let h = Harness::new(
        config,
        with_audio("standup.m4a"),
        MockModel::new(["Transcript"]),
        MockModel::new(["---\nfilename: [a, b]\n---\nBody\n"]),
    );

    let outcome = h.engine.process_next_file().await.unwrap();

    let failed = outcome.failures().next().unwrap();
    assert_eq!(failed.failed_phase, Some(StepPhase::ParseResponse));
    assert!(failed.output_files.is_empty());
    assert!(h.store.contents("inbox/transcripts/standup.md").is_some());
}

#[tokio::test]
async fn test_lenient_protocol_names_bad_sections() {
    let h = Harness::new(
        voice_config(),
        with_audio("standup.m4a"),
        MockModel::new(["Transcript"]),
        MockModel::new(["---\nfilename: [a, b]\n---\nBody\n"]),
    );

    let outcome = h.engine.process_next_file().await.unwrap();

    assert_eq!(outcome.status, ChainStatus::Completed);
    assert_eq!(outcome.results[1].output_files[0].path, "inbox/notes/section-1.md");
    assert!(h.store.contents("inbox/notes/section-1.md").unwrap().ends_with("Body\n"));
}

const NO_DEFAULT_ROUTE: &str = r#"
models:
  whisper:
    implementation: transcription
    model: whisper-1
  gpt:
    implementation: chat
    model: gpt-4o-mini
steps:
  transcribe:
    model: whisper
    input: inbox/audio
    output:
      classify: inbox/transcripts/{filename}.md
    archive: archive/{stepId}
  classify:
    model: gpt
    input: inbox/transcripts
    output:
      summarize: inbox/meetings/{filename}.md
    archive: archive/{stepId}
  summarize:
    model: gpt
    input: inbox/meetings
    output: notes/summaries
    archive: archive/{stepId}
"#;

/// No nextStep and no default output: nothing is written, nothing archived
#[tokio::test]
async fn test_unroutable_section_fails_write() {
    let config = PipelineConfiguration::from_yaml(NO_DEFAULT_ROUTE).unwrap();
    let h = Harness::new(
        config,
        with_audio("standup.m4a"),
        MockModel::new(["Transcript"]),
        MockModel::new(["Plain reply without routing"]),
    );

    let outcome = h.engine.process_next_file().await.unwrap();

    let failed = outcome.failures().next().unwrap();
    assert_eq!(failed.step_id, "classify");
    assert_eq!(failed.failed_phase, Some(StepPhase::WriteOutput));
    assert!(failed.error.as_deref().unwrap().contains("summarize"));
    assert!(h.store.contents("inbox/transcripts/standup.md").is_some());
    assert!(h.store.renames().iter().all(|(from, _)| from != "inbox/transcripts/standup.md"));
}

/// Archiving trouble is logged, not fatal; the input just stays put
#[tokio::test]
async fn test_rename_failure_keeps_chain_going() {
    let store = with_audio("standup.m4a");
    store.fail_renames(true);
    let h = Harness::new(
        voice_config(),
        store,
        MockModel::new(["Transcript"]),
        MockModel::new(["Just a note."]),
    );

    let outcome = h.engine.process_next_file().await.unwrap();

    assert_eq!(outcome.status, ChainStatus::Completed);
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].archive_path.as_deref(), Some("inbox/audio/standup.m4a"));
    assert_eq!(outcome.results[1].archive_path.as_deref(), Some("inbox/transcripts/standup.md"));
    assert!(h.store.contents("inbox/audio/standup.m4a").is_some());
    assert!(h.store.contents("inbox/notes/standup.md").is_some());
}

/// Excluding a failed source lets the next file through
#[tokio::test]
async fn test_failed_source_can_be_skipped() {
    let store = with_audio("a.m4a");
    store.insert("inbox/audio/b.m4a", vec![2u8; 8]);
    let whisper = MockModel::failing(AgentError::Timeout(30));
    whisper.push_response("Second memo");
    let h = Harness::new(voice_config(), store, whisper, MockModel::new(["A note."]));

    let first = h.engine.process_next_file().await.unwrap();
    assert_eq!(first.source.path, "inbox/audio/a.m4a");
    assert_eq!(first.status, ChainStatus::Failed);
    assert_eq!(first.results.len(), 1);

    let exclude: HashSet<String> = [first.source.path.clone()].into_iter().collect();
    let second = h.engine.process_next_file_excluding(&exclude).await.unwrap();
    assert_eq!(second.source.path, "inbox/audio/b.m4a");
    assert!(second.is_success());

    assert!(h.store.contents("inbox/audio/a.m4a").is_some());
    assert!(h.store.contents("archive/transcribe/b.m4a").is_some());
}

/// A source that could not be archived is not picked again in the same batch
#[tokio::test]
async fn test_batch_handles_each_unarchived_source_once() {
    let store = with_audio("a.m4a");
    store.insert("inbox/audio/b.m4a", vec![2u8; 8]);
    store.fail_renames(true);
    let h = Harness::new(
        voice_config(),
        store,
        MockModel::new(["First memo", "Second memo"]),
        MockModel::new(["Note one.", "Note two."]),
    );

    let outcomes = h.engine.process_batch(None).await.unwrap();

    let sources: Vec<_> = outcomes.iter().map(|o| o.source.path.as_str()).collect();
    assert_eq!(sources, vec!["inbox/audio/a.m4a", "inbox/audio/b.m4a"]);
    assert!(outcomes.iter().all(|o| o.is_success()));
    assert_eq!(h.whisper.calls().len(), 2);
    assert!(h.store.contents("inbox/audio/a.m4a").is_some());
    assert!(h.store.contents("inbox/audio/b.m4a").is_some());
}

#[tokio::test]
async fn test_batch_respects_limit() {
    let store = with_audio("a.m4a");
    store.insert("inbox/audio/b.m4a", vec![2u8; 8]);
    let h = Harness::new(
        voice_config(),
        store,
        MockModel::new(["First memo"]),
        MockModel::new(["Note one."]),
    );

    let outcomes = h.engine.process_batch(Some(1)).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].source.path, "inbox/audio/a.m4a");
    assert!(h.store.contents("inbox/audio/b.m4a").is_some());
}
