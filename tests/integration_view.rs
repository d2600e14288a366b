#![allow(dead_code)]

include!("../src/main.rs");

#[test]
fn integration_scan_load_and_project_a_transcript() {
    let dir = std::env::temp_dir().join(format!("ate-int-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("mkdir");
    let data = r#"{
        "runSettings": {"model": "gemini-pro"},
        "chunkedPrompt": {"chunks": [
            {"role": "user", "text": "Explain borrowing", "tokenCount": 3},
            {"role": "model", "text": "Considering ownership...", "isThought": true},
            {"role": "model", "text": "References borrow values without taking ownership."}
        ]}
    }"#;
    fs::write(dir.join("session.json"), data).expect("write");
    fs::write(dir.join("screenshot.png"), [0u8; 4]).expect("write png");

    let mut files = scan_folder(&dir).expect("scan");
    sort_roster(&mut files, SortKey::Alphabetical);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "session.json");

    let SourceRef::Local(path) = &files[0].source else {
        panic!("expected a local descriptor");
    };
    let raw = fs::read_to_string(path).expect("read");
    let transcript = parse_transcript(&raw).expect("parse");
    let prompts = derive_prompts(&transcript);
    assert_eq!(prompts.len(), 1);

    let records = project_single(&transcript, &prompts, 0).expect("project");
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].kind, RecordKind::UserPrompt);
    assert!(records[1].collapsed);
    assert!(!records[2].collapsed);

    let rendered: Vec<String> = project_complete(&transcript)
        .iter()
        .map(|record| record_header_line(record, false).to_string())
        .collect();
    assert!(rendered[0].contains("User Prompt"));
    assert!(rendered[1].contains("Model (Thought Process)"));
    assert!(rendered[2].contains("Model Response"));
}

#[test]
fn integration_malformed_file_reports_and_installs_nothing() {
    let dir = std::env::temp_dir().join(format!("ate-int-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("broken.json"), "{ this is not json").expect("write");

    let files = scan_folder(&dir).expect("scan");
    let SourceRef::Local(path) = &files[0].source else {
        panic!("expected a local descriptor");
    };
    let raw = fs::read_to_string(path).expect("read");
    assert!(matches!(
        parse_transcript(&raw),
        Err(LoadError::MalformedJson(_))
    ));
}
