#![allow(dead_code)]

include!("../src/main.rs");

fn temp_transcripts_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ate-roster-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("mkdir");
    dir
}

fn local(name: &str, modified_ms: i64) -> FileDescriptor {
    FileDescriptor {
        name: name.to_string(),
        modified_ms,
        source: SourceRef::Local(PathBuf::from(name)),
    }
}

#[test]
fn scan_excludes_denylisted_extensions() {
    let dir = temp_transcripts_dir();
    for name in [
        "chat.json",
        "notes.txt",
        "image.png",
        "photo.jpg",
        "sticker.webp",
        "paper.pdf",
        "helper.js",
        "bundle.zip",
    ] {
        fs::write(dir.join(name), "{}").expect("write");
    }

    let mut files = scan_folder(&dir).expect("scan");
    sort_roster(&mut files, SortKey::Alphabetical);

    let names: Vec<&str> = files.iter().map(|file| file.name.as_str()).collect();
    assert_eq!(names, ["chat.json", "notes.txt"]);
}

#[test]
fn scan_lists_immediate_children_only() {
    let dir = temp_transcripts_dir();
    fs::write(dir.join("top.json"), "{}").expect("write");
    fs::create_dir_all(dir.join("nested")).expect("mkdir nested");
    fs::write(dir.join("nested").join("inner.json"), "{}").expect("write nested");

    let files = scan_folder(&dir).expect("scan");
    let names: Vec<&str> = files.iter().map(|file| file.name.as_str()).collect();
    assert_eq!(names, ["top.json"]);
}

#[test]
fn scan_of_a_missing_folder_is_a_source_access_error() {
    let dir = temp_transcripts_dir().join("does-not-exist");
    let err = scan_folder(&dir).expect_err("must fail");
    assert!(matches!(err, LoadError::SourceAccess(_)));
}

#[test]
fn alphabetical_sort_is_case_insensitive() {
    let mut files = vec![
        local("Zebra.json", 1),
        local("apple.json", 2),
        local("Banana.json", 3),
    ];
    sort_roster(&mut files, SortKey::Alphabetical);
    let names: Vec<&str> = files.iter().map(|file| file.name.as_str()).collect();
    assert_eq!(names, ["apple.json", "Banana.json", "Zebra.json"]);
}

#[test]
fn alphabetical_sort_is_stable_for_equal_keys() {
    let mut files = vec![local("a.json", 1), local("A.json", 2)];
    sort_roster(&mut files, SortKey::Alphabetical);
    let names: Vec<&str> = files.iter().map(|file| file.name.as_str()).collect();
    assert_eq!(names, ["a.json", "A.json"]);
}

#[test]
fn recency_sort_is_newest_first() {
    let mut files = vec![
        local("old.json", 1_000),
        local("new.json", 3_000),
        local("middle.json", 2_000),
    ];
    sort_roster(&mut files, SortKey::Recency);
    let names: Vec<&str> = files.iter().map(|file| file.name.as_str()).collect();
    assert_eq!(names, ["new.json", "middle.json", "old.json"]);
}

#[test]
fn denylist_check_ignores_extension_case() {
    assert!(denylisted("shot.PNG"));
    assert!(denylisted("paper.pdf"));
    assert!(!denylisted("chat.json"));
    assert!(!denylisted("no_extension"));
}

#[test]
fn drive_modified_time_converts_to_epoch_millis() {
    assert_eq!(parse_rfc3339_millis("1970-01-01T00:00:01Z"), Some(1_000));
    assert_eq!(
        parse_rfc3339_millis("2024-05-01T00:00:00+00:00"),
        Some(1_714_521_600_000)
    );
    assert_eq!(parse_rfc3339_millis("not a date"), None);
}

#[test]
fn content_cache_fetches_each_id_exactly_once() {
    let mut cache = ContentCache::default();
    let calls = std::cell::Cell::new(0usize);

    let first = cache
        .get_or_fetch("drive-id-1", || {
            calls.set(calls.get() + 1);
            Ok(String::from("{\"chunkedPrompt\":{\"chunks\":[]}}"))
        })
        .expect("first fetch");
    let second = cache
        .get_or_fetch("drive-id-1", || {
            calls.set(calls.get() + 1);
            Ok(String::from("never used"))
        })
        .expect("cached fetch");

    assert_eq!(calls.get(), 1);
    assert_eq!(first, second);
    assert_eq!(cache.len(), 1);
}

#[test]
fn content_cache_keeps_ids_separate_and_skips_failed_fetches() {
    let mut cache = ContentCache::default();

    let err = cache
        .get_or_fetch("bad-id", || {
            Err(LoadError::SourceAccess(String::from("boom")))
        })
        .expect_err("propagates");
    assert!(matches!(err, LoadError::SourceAccess(_)));
    assert_eq!(cache.len(), 0);

    cache
        .get_or_fetch("good-id", || Ok(String::from("{}")))
        .expect("fetch");
    assert_eq!(cache.len(), 1);
}
