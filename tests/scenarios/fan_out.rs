//! Test: Fan-out - one response split into several routed files

use crate::helpers::*;
use voxchain::execution::{ChainStatus, ExecutionEvent};

fn harness() -> Harness {
    let store = seeded_store();
    store.insert("inbox/audio/standup.m4a", vec![7u8; 16]);
    let whisper = MockModel::new(["Standup, then some thoughts about the week."]);

    let mut classify = String::new();
    classify.push_str(&block("standup-notes.md", Some("summarize"), "Standup discussion"));
    classify.push_str(&block("feelings.md", Some("journal"), "Thoughts about the week"));
    classify.push_str(&block("untitled.md", None, "Leftover remarks"));
    let gpt = MockModel::new([
        classify,
        "Standup summary.".to_string(),
        "Journal entry.".to_string(),
    ]);
    Harness::new(voice_config(), store, whisper, gpt)
}

#[tokio::test]
async fn test_each_section_lands_at_its_route() {
    let h = harness();

    let outcome = h.engine.process_next_file().await.unwrap();
    assert_eq!(outcome.status, ChainStatus::Completed);

    let classify = &outcome.results[1];
    assert_eq!(classify.step_id, "classify");
    let outputs: Vec<_> = classify
        .output_files
        .iter()
        .map(|f| (f.path.as_str(), f.next_step.as_deref()))
        .collect();
    assert_eq!(outputs.len(), 3);
    assert_eq!(outputs[0], ("inbox/meetings/standup-notes.md", Some("summarize")));
    assert!(outputs[1].0.starts_with("journal/"));
    assert!(outputs[1].0.ends_with("/feelings.md"));
    assert_eq!(outputs[1].1, Some("journal"));
    // Placeholder names fall back to the input's own name
    assert_eq!(outputs[2], ("inbox/notes/standup.md", None));

    // All three outputs point back at the same archived transcript
    for (path, _) in &outputs {
        let written = h.store.contents(path).unwrap();
        assert!(written.contains("[[archive/classify/standup.md]]"), "{}", written);
    }
    assert!(h.store.contents("inbox/notes/standup.md").unwrap().ends_with("Leftover remarks\n"));
}

/// Routed outputs are followed first-in first-out
#[tokio::test]
async fn test_routed_outputs_follow_in_order() {
    let h = harness();

    let outcome = h.engine.process_next_file().await.unwrap();

    let order: Vec<_> = outcome.results.iter().map(|r| r.step_id.as_str()).collect();
    assert_eq!(order, vec!["transcribe", "classify", "summarize", "journal"]);
    assert_eq!(outcome.results[2].input_path, "inbox/meetings/standup-notes.md");
    assert!(outcome.results[3].input_path.ends_with("/feelings.md"));

    assert_eq!(
        outcome.results[2].output_files[0].path,
        "notes/summaries/standup-notes.md"
    );
    assert_eq!(outcome.results[3].output_files[0].path, "journal/entries/feelings.md");
    assert_eq!(
        outcome.results[3].archive_path.as_deref(),
        Some("archive/journal/feelings.md")
    );

    let requests = h.gpt.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[1].contains("role: input\nfilename: standup-notes.md\n"));
    assert!(requests[1].contains("Standup discussion\n"));
    assert!(requests[2].contains("role: input\nfilename: feelings.md\n"));
    assert!(requests[2].contains("Thoughts about the week\n"));
}

#[tokio::test]
async fn test_completed_event_lists_next_steps() {
    let h = harness();
    h.engine.process_next_file().await.unwrap();

    let classify = h
        .events()
        .into_iter()
        .find_map(|e| match e {
            ExecutionEvent::StepCompleted { step_id, outputs, next_steps, .. }
                if step_id == "classify" =>
            {
                Some((outputs, next_steps))
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(classify.0.len(), 3);
    assert_eq!(classify.1, vec!["summarize".to_string(), "journal".to_string()]);

    let stats = h.engine.stats();
    assert_eq!(stats.multi_file_responses, 1);
    assert_eq!(stats.sections_parsed, 5);
    assert_eq!(stats.routed_sections, 2);
}

/// Two placeholder-named sections for the same step must not share a file
#[tokio::test]
async fn test_colliding_sections_are_kept_apart() {
    let store = seeded_store();
    store.insert("inbox/audio/standup.m4a", vec![7u8; 16]);
    let mut classify = String::new();
    classify.push_str(&block("response.md", Some("summarize"), "First meeting"));
    classify.push_str(&block("untitled.md", Some("summarize"), "Second meeting"));
    let gpt = MockModel::new([classify, "Summary one.".to_string(), "Summary two.".to_string()]);
    let h = Harness::new(voice_config(), store, MockModel::new(["Two meetings"]), gpt);

    let outcome = h.engine.process_next_file().await.unwrap();

    assert_eq!(outcome.status, ChainStatus::Completed);
    let hops: Vec<_> = outcome
        .results
        .iter()
        .map(|r| (r.step_id.as_str(), r.input_path.as_str()))
        .collect();
    assert_eq!(
        hops,
        vec![
            ("transcribe", "inbox/audio/standup.m4a"),
            ("classify", "inbox/transcripts/standup.md"),
            ("summarize", "inbox/meetings/standup.md"),
            ("summarize", "inbox/meetings/standup-1.md"),
        ]
    );
    let archived = |name: &str| h.store.contents(&format!("archive/summarize/{}", name)).unwrap();
    assert!(archived("standup.md").contains("First meeting"));
    assert!(archived("standup-1.md").contains("Second meeting"));
    assert!(h.store.contents("notes/summaries/standup.md").unwrap().ends_with("Summary one.\n"));
    assert!(h.store.contents("notes/summaries/standup-1.md").unwrap().ends_with("Summary two.\n"));
}
