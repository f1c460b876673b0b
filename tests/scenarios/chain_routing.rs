//! Test: Chain Routing - a voice note followed through every hop

use crate::helpers::*;
use voxchain::core::{PipelineError, StepStatus};
use voxchain::execution::{ChainStatus, ExecutionEvent};

fn harness() -> Harness {
    let store = seeded_store();
    store.insert("inbox/audio/standup.m4a", vec![0u8; 64]);
    let whisper = MockModel::new(["We reviewed the launch plan."]);
    let gpt = MockModel::new([
        block("launch-review.md", Some("summarize"), "Launch review transcript"),
        "Summary: launch is on track.".to_string(),
    ]);
    Harness::new(voice_config(), store, whisper, gpt)
}

/// Transcribe -> classify -> summarize, each hop picked by the previous output
#[tokio::test]
async fn test_chain_follows_model_routing() {
    let h = harness();

    let outcome = h.engine.process_next_file().await.unwrap();

    assert_eq!(outcome.status, ChainStatus::Completed);
    assert_eq!(outcome.source.step_id, "transcribe");
    assert_eq!(outcome.source.path, "inbox/audio/standup.m4a");
    let hops: Vec<_> = outcome
        .results
        .iter()
        .map(|r| (r.step_id.as_str(), r.input_path.as_str(), r.status))
        .collect();
    assert_eq!(
        hops,
        vec![
            ("transcribe", "inbox/audio/standup.m4a", StepStatus::Completed),
            ("classify", "inbox/transcripts/standup.md", StepStatus::Completed),
            ("summarize", "inbox/meetings/launch-review.md", StepStatus::Completed),
        ]
    );

    assert_eq!(outcome.results[0].next_step.as_deref(), Some("classify"));
    assert_eq!(outcome.results[1].next_step.as_deref(), Some("summarize"));
    assert_eq!(outcome.results[2].next_step, None);

    // Every input was archived under its own step
    assert_eq!(outcome.results[0].archive_path.as_deref(), Some("archive/transcribe/standup.m4a"));
    assert_eq!(outcome.results[1].archive_path.as_deref(), Some("archive/classify/standup.md"));
    assert_eq!(
        outcome.results[2].archive_path.as_deref(),
        Some("archive/summarize/launch-review.md")
    );

    let summary = h.store.contents("notes/summaries/launch-review.md").unwrap();
    assert!(summary.contains("[[archive/summarize/launch-review.md]]"));
    assert!(summary.contains("step: summarize"));
    assert!(summary.ends_with("Summary: launch is on track.\n"));
}

/// The classify step is offered its routes; the terminal step is not
#[tokio::test]
async fn test_routing_section_only_for_routing_steps() {
    let h = harness();
    h.engine.process_next_file().await.unwrap();

    let requests = h.gpt.requests();
    assert_eq!(requests.len(), 2);

    let classify = &requests[0];
    // The input is the transcript file as written, metadata included
    assert!(classify.starts_with("---\nrole: input\nfilename: standup.md\n---\n---\nsource: "));
    assert!(classify.contains("We reviewed the launch plan.\n"));
    let prompt = "filename: prompts/classify.md\n---\nDecide what kind of note this is.\n";
    assert!(classify.contains(&format!("role: prompt\n{}", prompt)));
    assert!(classify.contains("role: routing\n---\nAvailable next steps:\n"));
    assert!(classify.contains("- summarize: Meeting recordings that need a summary\n"));
    assert!(classify.contains("- journal: Personal reflections\n"));

    assert!(!requests[1].contains("role: routing"));
    assert_eq!(
        h.whisper.calls(),
        vec![MockCall::Transcribe { filename: "standup.m4a".to_string(), bytes: 64 }]
    );
}

#[tokio::test]
async fn test_events_and_stats() {
    let h = harness();
    h.engine.process_next_file().await.unwrap();

    let events = h.events();
    assert!(matches!(
        events.first(),
        Some(ExecutionEvent::FileSelected { step_id, .. }) if step_id == "transcribe"
    ));
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::ChainCompleted { status: ChainStatus::Completed, steps_run: 3, .. })
    ));
    let started: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepStarted { step_id, .. } => Some(step_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec!["transcribe", "classify", "summarize"]);

    let stats = h.engine.stats();
    assert_eq!(stats.sections_parsed, 2);
    assert_eq!(stats.routed_sections, 1);
    assert_eq!(stats.multi_file_responses, 0);
}

/// Once the only input is handled, discovery reports nothing to do
#[tokio::test]
async fn test_nothing_left_after_chain() {
    let h = harness();
    h.engine.process_next_file().await.unwrap();

    let err = h.engine.process_next_file().await.unwrap_err();
    assert!(matches!(err, PipelineError::NoFilesFound));
    assert!(err.is_recoverable());
}
