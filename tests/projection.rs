#![allow(dead_code)]

include!("../src/main.rs");

fn scenario_transcript() -> Transcript {
    let raw = r#"{"chunkedPrompt": {"chunks": [
        {"role": "user", "text": "Hi", "tokenCount": 2},
        {"role": "model", "text": "thinking...", "isThought": true},
        {"role": "model", "text": "Hello!"},
        {"role": "user", "text": "Bye"}
    ]}}"#;
    parse_transcript(raw).expect("parse")
}

#[test]
fn complete_dialog_has_one_record_per_chunk_in_order() {
    let transcript = scenario_transcript();
    let records = project_complete(&transcript);

    assert_eq!(records.len(), transcript.chunks.len());
    for (idx, record) in records.iter().enumerate() {
        assert_eq!(record.chunk_position, Some(idx));
    }
}

#[test]
fn complete_dialog_collapses_only_thought_chunks() {
    let records = project_complete(&scenario_transcript());

    assert_eq!(records[0].kind, RecordKind::UserPrompt);
    assert!(!records[0].collapsed);
    assert_eq!(records[1].kind, RecordKind::ModelThought);
    assert!(records[1].collapsed);
    assert_eq!(records[2].kind, RecordKind::ModelResponse);
    assert!(!records[2].collapsed);
    assert_eq!(records[3].kind, RecordKind::UserPrompt);
    assert!(!records[3].collapsed);
}

#[test]
fn single_prompt_projection_for_answered_prompt() {
    let transcript = scenario_transcript();
    let prompts = derive_prompts(&transcript);

    let records = project_single(&transcript, &prompts, 0).expect("in range");
    assert_eq!(records.len(), 3);

    assert_eq!(records[0].kind, RecordKind::UserPrompt);
    assert_eq!(records[0].text.as_deref(), Some("Hi"));
    assert!(!records[0].collapsed);

    assert_eq!(records[1].kind, RecordKind::ModelThought);
    assert_eq!(records[1].text.as_deref(), Some("thinking..."));
    assert!(records[1].collapsed);

    assert_eq!(records[2].kind, RecordKind::ModelResponse);
    assert_eq!(records[2].text.as_deref(), Some("Hello!"));
    assert!(!records[2].collapsed);
}

#[test]
fn single_prompt_projection_for_unanswered_prompt_gets_placeholder() {
    let transcript = scenario_transcript();
    let prompts = derive_prompts(&transcript);

    let records = project_single(&transcript, &prompts, 1).expect("in range");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].text.as_deref(), Some("Bye"));
    assert_eq!(records[1].kind, RecordKind::NoResponse);
    assert_eq!(records[1].text.as_deref(), Some(NO_RESPONSE_PLACEHOLDER));
}

#[test]
fn single_prompt_projection_out_of_range_is_a_no_op() {
    let transcript = scenario_transcript();
    let prompts = derive_prompts(&transcript);

    assert!(project_single(&transcript, &prompts, 2).is_none());
    assert!(project_single(&transcript, &prompts, usize::MAX).is_none());
}

#[test]
fn collapse_toggle_is_local_to_the_record() {
    let transcript = scenario_transcript();
    let mut records = project_complete(&transcript);

    records[1].collapsed = !records[1].collapsed;
    assert!(!records[1].collapsed);

    // Nothing else moved; a fresh projection still collapses the thought.
    let fresh = project_complete(&transcript);
    assert!(fresh[1].collapsed);
    assert_eq!(records[0], fresh[0]);
    assert_eq!(records[2], fresh[2]);
}

#[test]
fn truncate_label_cuts_long_first_lines_at_the_budget() {
    let text = "Hello world this is a very long first line exceeding sixty characters for sure";
    let label = truncate_label(Some(text), 60);

    let expected: String = text.chars().take(60).collect();
    assert_eq!(label, format!("{expected}..."));
    assert_eq!(label.chars().count(), 63);
}

#[test]
fn truncate_label_keeps_short_first_lines_untouched() {
    assert_eq!(truncate_label(Some("short prompt"), 60), "short prompt");

    let exactly_sixty = "x".repeat(60);
    assert_eq!(truncate_label(Some(&exactly_sixty), 60), exactly_sixty);
}

#[test]
fn truncate_label_uses_only_the_first_line() {
    let label = truncate_label(Some("first line\nsecond line is ignored"), 60);
    assert_eq!(label, "first line");
}

#[test]
fn truncate_label_falls_back_to_the_placeholder() {
    assert_eq!(truncate_label(None, 60), UNTITLED_PROMPT);
    assert_eq!(truncate_label(Some(""), 60), UNTITLED_PROMPT);
}

#[test]
fn record_headers_follow_the_role_and_thought_flag() {
    assert_eq!(RecordKind::UserPrompt.header(), "User Prompt");
    assert_eq!(RecordKind::ModelResponse.header(), "Model Response");
    assert_eq!(RecordKind::ModelThought.header(), "Model (Thought Process)");
    assert_eq!(RecordKind::UnknownRole.header(), "Unknown Role");
}

#[test]
fn markdown_renders_headings_and_fenced_code() {
    let lines = markdown_lines("# Title\n\nSome **bold** text\n\n```rust\nlet x = 1;\n```");
    let rendered: Vec<String> = lines.iter().map(|line| line.to_string()).collect();

    assert!(rendered.iter().any(|line| line.contains("# Title")));
    assert!(rendered.iter().any(|line| line.contains("bold")));
    assert!(rendered.iter().any(|line| line.contains("```rust")));
    assert!(rendered.iter().any(|line| line.contains("let x = 1;")));
}

#[test]
fn markdown_of_empty_text_renders_nothing() {
    assert!(markdown_lines("").is_empty());
    assert!(markdown_lines("   \n  ").is_empty());
}
