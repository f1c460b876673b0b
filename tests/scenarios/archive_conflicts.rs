//! Test: Archive conflicts - existing archive entries are never overwritten

use crate::helpers::*;

#[tokio::test]
async fn test_archive_picks_next_free_name() {
    let store = seeded_store();
    store.insert("inbox/audio/memo.m4a", "new recording");
    store.insert("archive/transcribe/memo.m4a", "first recording");
    store.insert("archive/transcribe/memo-1.m4a", "second recording");
    let h = Harness::new(
        voice_config(),
        store,
        MockModel::new(["Memo transcript"]),
        MockModel::new(["A plain note."]),
    );

    let outcome = h.engine.process_next_file().await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(
        outcome.results[0].archive_path.as_deref(),
        Some("archive/transcribe/memo-2.m4a")
    );
    assert_eq!(h.store.contents("archive/transcribe/memo.m4a").as_deref(), Some("first recording"));
    assert_eq!(
        h.store.contents("archive/transcribe/memo-1.m4a").as_deref(),
        Some("second recording")
    );
    assert_eq!(h.store.contents("archive/transcribe/memo-2.m4a").as_deref(), Some("new recording"));

    let moves: Vec<_> = h
        .store
        .renames()
        .into_iter()
        .filter(|(from, _)| from == "inbox/audio/memo.m4a")
        .collect();
    assert_eq!(moves.len(), 1);

    // The transcript links to where the recording actually went
    let transcript = h.store.contents("archive/classify/memo.md").unwrap();
    assert!(transcript.contains("[[archive/transcribe/memo-2.m4a]]"), "{}", transcript);
}

/// Two runs of the same name in a row keep both archived copies
#[tokio::test]
async fn test_repeated_names_accumulate() {
    let store = seeded_store();
    store.insert("inbox/audio/memo.m4a", "take one");
    let h = Harness::new(
        voice_config(),
        store,
        MockModel::new(["One", "Two"]),
        MockModel::new(["Note one.", "Note two."]),
    );

    h.engine.process_next_file().await.unwrap();
    h.store.insert("inbox/audio/memo.m4a", "take two");
    h.engine.process_next_file().await.unwrap();

    assert_eq!(h.store.contents("archive/transcribe/memo.m4a").as_deref(), Some("take one"));
    assert_eq!(h.store.contents("archive/transcribe/memo-1.m4a").as_deref(), Some("take two"));
    assert!(h.store.contents("archive/classify/memo.md").is_some());
    assert!(h.store.contents("archive/classify/memo-1.md").is_some());
    // Output of the second run replaced the first
    assert!(h.store.contents("inbox/notes/memo.md").unwrap().ends_with("Note two.\n"));
}
