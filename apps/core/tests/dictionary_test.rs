use std::sync::Arc;
use std::time::Duration;

use phrasefind_core::dictionary::{Dictionary, CLOSE_DIALOG_DIRECTIVE};
use phrasefind_core::entry_store::StoreError;
use phrasefind_core::model::Entry;
use phrasefind_core::settings::DictionarySettings;

fn outline(strokes: &[&str]) -> Vec<String> {
    strokes.iter().map(|s| s.to_string()).collect()
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("phrases.json");

    let dictionary = Dictionary::create(&path, DictionarySettings::default());
    assert!(dictionary.add(Entry::new("Hello world", "greeting", &["H", "W"])).unwrap());
    assert!(dictionary.add(Entry::new("Goodbye", "farewell", &[])).unwrap());
    dictionary.save().unwrap();

    let (loaded, warnings) = Dictionary::load(&path).unwrap();
    assert!(warnings.is_empty());
    assert_eq!(loaded.snapshot().unwrap(), dictionary.snapshot().unwrap());
    assert_eq!(loaded.longest_key().unwrap(), 2);
}

#[test]
fn save_replaces_previous_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("phrases.json");
    let dictionary = Dictionary::create(&path, DictionarySettings::default());
    let entry = Entry::new("Hello", "greeting", &[]);

    dictionary.add(entry.clone()).unwrap();
    dictionary.save().unwrap();
    dictionary.remove(&entry).unwrap();
    dictionary.save().unwrap();

    let (loaded, _) = Dictionary::load(&path).unwrap();
    assert!(loaded.search("").unwrap().is_empty());
    let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}

#[test]
fn reload_picks_up_external_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("phrases.json");
    let dictionary = Dictionary::create(&path, DictionarySettings::default());
    dictionary.save().unwrap();

    std::fs::write(
        &path,
        r#"{"version": 1, "search_stroke": "SPWR-FP", "entries": [["Hi", "greeting", ["H"]]]}"#,
    )
    .unwrap();
    let warnings = dictionary.reload().unwrap();

    assert!(warnings.is_empty());
    assert_eq!(
        dictionary.lookup(&outline(&["H"])).unwrap(),
        Some(Entry::new("Hi", "greeting", &["H"]))
    );
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Dictionary::load(dir.path().join("absent.json")),
        Err(StoreError::Io(_))
    ));
}

#[test]
fn reentrant_access_times_out() {
    let dictionary = Dictionary::create("unused.json", DictionarySettings::default())
        .with_lock_timeout(Duration::from_millis(50));

    let inner = dictionary.with_store(|_| dictionary.add(Entry::new("a", "b", &[])));

    let error = inner.unwrap().unwrap_err();
    assert!(matches!(error, StoreError::LockTimeout(_)));
    assert!(error.is_fatal());
}

#[test]
fn with_store_reads_under_the_lock() {
    let dictionary = Dictionary::create("unused.json", DictionarySettings::default());
    dictionary.add(Entry::new("Hello", "greeting", &["H"])).unwrap();
    dictionary.add(Entry::new("Bye", "farewell", &[])).unwrap();

    let translations = dictionary
        .with_store(|store| {
            store
                .entries()
                .iter()
                .map(|entry| entry.translation.clone())
                .collect::<Vec<_>>()
        })
        .unwrap();

    assert_eq!(translations, vec!["Hello", "Bye"]);
}

#[test]
fn concurrent_adds_are_serialized() {
    let dictionary = Arc::new(Dictionary::create("unused.json", DictionarySettings::default()));
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let dictionary = Arc::clone(&dictionary);
            std::thread::spawn(move || {
                for i in 0..25 {
                    let brief = vec![format!("K{}", i % 10)];
                    let entry = Entry::from_owned(format!("w{worker}-{i}"), "x".into(), brief);
                    dictionary.add(entry).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let store = dictionary.snapshot().unwrap();
    assert_eq!(store.len(), 10);
    store.check_invariants().unwrap();
}

#[test]
fn search_stroke_yields_show_dialog_directive() {
    let dictionary = Dictionary::create("/tmp/phrases.json", DictionarySettings::default());
    let directive = dictionary
        .translate(&outline(&["SPWR-FP"]), false)
        .unwrap()
        .unwrap();
    assert_eq!(
        directive,
        "{:command:phrasefind_show_dialog:/tmp/phrases.json}{^}"
    );
}

#[test]
fn translate_prepends_close_directive_only_while_showing_with_pick_on_write() {
    let settings = DictionarySettings {
        pick_on_write: true,
        ..DictionarySettings::default()
    };
    let dictionary = Dictionary::create("phrases.json", settings);
    dictionary.add(Entry::new("Hello", "greeting", &["H"])).unwrap();
    let brief = outline(&["H"]);

    assert_eq!(
        dictionary.translate(&brief, false).unwrap().as_deref(),
        Some("Hello")
    );
    assert_eq!(
        dictionary.translate(&brief, true).unwrap(),
        Some(format!("{CLOSE_DIALOG_DIRECTIVE}Hello"))
    );
    assert_eq!(dictionary.translate(&outline(&["X"]), true).unwrap(), None);
}

#[test]
fn translate_without_pick_on_write_never_closes() {
    let dictionary = Dictionary::create("phrases.json", DictionarySettings::default());
    dictionary.add(Entry::new("Hello", "greeting", &["H"])).unwrap();
    assert_eq!(
        dictionary.translate(&outline(&["H"]), true).unwrap().as_deref(),
        Some("Hello")
    );
}
