use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use phrasefind_core::channel::{Channel, ChannelBuilder, ChannelError};
use phrasefind_core::dialog::{DialogView, FormFields};
use phrasefind_core::dialog_process::{DialogOptions, DialogProcess, UiEvent};
use phrasefind_core::dictionary::{Dictionary, CLOSE_DIALOG_DIRECTIVE};
use phrasefind_core::manager::{HostEngine, HostManager, ManagerError, MockHostEngine};
use phrasefind_core::model::Entry;
use phrasefind_core::protocol::{EditArgs, PickedArgs, EDIT_TRANSLATION, PICKED};
use phrasefind_core::settings::DictionarySettings;
use phrasefind_core::transport::memory_pipe;

const WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, Default)]
struct ViewState {
    visible: bool,
    rows: Vec<Entry>,
    feedback: String,
    messages: Vec<String>,
}

#[derive(Clone, Default)]
struct SharedView(Arc<Mutex<ViewState>>);

impl SharedView {
    fn read<T>(&self, f: impl FnOnce(&ViewState) -> T) -> T {
        f(&self.0.lock().unwrap())
    }
}

impl DialogView for SharedView {
    fn show(&mut self) {
        self.0.lock().unwrap().visible = true;
    }

    fn hide(&mut self) {
        self.0.lock().unwrap().visible = false;
    }

    fn rows_changed(&mut self, rows: &[Entry], _selected: Option<usize>) {
        self.0.lock().unwrap().rows = rows.to_vec();
    }

    fn form_changed(&mut self, _form: &FormFields) {}

    fn set_brief_feedback(&mut self, message: &str) {
        self.0.lock().unwrap().feedback = message.to_string();
    }

    fn show_message(&mut self, message: &str) {
        self.0.lock().unwrap().messages.push(message.to_string());
    }
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

struct Harness {
    manager: HostManager,
    dialog: DialogProcess,
    view: SharedView,
    engine: Arc<MockHostEngine>,
}

fn harness(engine: MockHostEngine) -> Harness {
    let (host_reader, dialog_writer) = memory_pipe();
    let (dialog_reader, host_writer) = memory_pipe();
    let view = SharedView::default();
    let dialog = DialogProcess::spawn(
        dialog_reader,
        dialog_writer,
        view.clone(),
        DialogOptions {
            request_timeout: WAIT,
            search_debounce: Duration::from_millis(10),
        },
    );
    let engine = Arc::new(engine);
    let host_engine: Arc<dyn HostEngine> = engine.clone();
    let manager = HostManager::with_transport(host_reader, host_writer, host_engine, WAIT);
    Harness {
        manager,
        dialog,
        view,
        engine,
    }
}

// Host manager wired to a bare channel standing in for the dialog process.
fn raw_dialog(engine: Arc<MockHostEngine>) -> (HostManager, Channel) {
    let (host_reader, dialog_writer) = memory_pipe();
    let (dialog_reader, host_writer) = memory_pipe();
    let dialog = ChannelBuilder::new().spawn(dialog_reader, dialog_writer);
    let host_engine: Arc<dyn HostEngine> = engine;
    let manager = HostManager::with_transport(host_reader, host_writer, host_engine, WAIT);
    (manager, dialog)
}

fn dictionary(path: &str, settings: DictionarySettings) -> Arc<Dictionary> {
    let dictionary = Dictionary::create(path, settings);
    dictionary
        .add(Entry::new("Hello world", "greeting", &["H"]))
        .unwrap();
    dictionary
        .add(Entry::new("Goodbye", "farewell", &["G"]))
        .unwrap();
    Arc::new(dictionary)
}

fn open(harness: &Harness, dictionary: &Arc<Dictionary>) {
    harness.manager.open_dialog(Arc::clone(dictionary)).unwrap();
    wait_until("browse results", || {
        harness.view.read(|v| v.visible && v.rows.len() == 2)
    });
}

#[test]
fn search_then_pick_injects_translation() {
    let h = harness(MockHostEngine::default());
    let dict = dictionary("pick.json", DictionarySettings::default());
    open(&h, &dict);
    assert!(h.manager.is_showing(&dict));

    assert!(h.dialog.post(UiEvent::DescriptionEdited("farewel".into())));
    wait_until("search results", || {
        h.view
            .read(|v| v.rows.first().map(|e| e.translation.as_str()) == Some("Goodbye"))
    });
    h.dialog.post(UiEvent::Pick);

    wait_until("injection", || h.engine.injected() == vec!["Goodbye"]);
    wait_until("dialog hidden", || h.view.read(|v| !v.visible));
    assert!(h.manager.active_dictionary().is_none());
    assert_eq!(h.manager.last_translation().as_deref(), Some("Goodbye"));

    h.manager.resend_last().unwrap();
    assert_eq!(h.engine.injected(), vec!["Goodbye", "Goodbye"]);
}

#[test]
fn cancel_clears_active_dictionary_without_injecting() {
    let h = harness(MockHostEngine::default());
    let dict = dictionary("cancel.json", DictionarySettings::default());
    open(&h, &dict);

    h.dialog.post(UiEvent::Cancel);

    wait_until("active cleared", || h.manager.active_dictionary().is_none());
    assert!(h.engine.injected().is_empty());
    assert!(matches!(
        h.manager.resend_last(),
        Err(ManagerError::NothingToResend)
    ));
}

#[test]
fn only_one_dialog_may_be_open() {
    let h = harness(MockHostEngine::default());
    let first = dictionary("first.json", DictionarySettings::default());
    let second = dictionary("second.json", DictionarySettings::default());
    open(&h, &first);

    let error = h.manager.open_dialog(second).unwrap_err();

    match error {
        ManagerError::DialogBusy(path) => assert_eq!(path.to_string_lossy(), "first.json"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn close_dialog_returns_after_hide() {
    let h = harness(MockHostEngine::default());
    let dict = dictionary("close.json", DictionarySettings::default());
    open(&h, &dict);

    h.manager.close_dialog().unwrap();

    assert!(h.view.read(|v| !v.visible));
    assert!(!h.manager.is_showing(&dict));
    assert!(matches!(
        h.manager.close_dialog(),
        Err(ManagerError::NoDialogOpen)
    ));
}

#[test]
fn translate_closes_dialog_only_while_showing() {
    let h = harness(MockHostEngine::default());
    let settings = DictionarySettings {
        pick_on_write: true,
        ..DictionarySettings::default()
    };
    let dict = dictionary("write.json", settings);
    let brief = vec!["H".to_string()];

    assert_eq!(
        h.manager.translate(&dict, &brief).unwrap().as_deref(),
        Some("Hello world")
    );
    open(&h, &dict);
    assert_eq!(
        h.manager.translate(&dict, &brief).unwrap(),
        Some(format!("{CLOSE_DIALOG_DIRECTIVE}Hello world"))
    );
}

#[test]
fn submitted_entry_is_added_and_saved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("phrases.json");
    let h = harness(MockHostEngine::default());
    let dict = dictionary(path.to_str().unwrap(), DictionarySettings::default());
    open(&h, &dict);

    h.dialog.post(UiEvent::TranslationEdited("See you".into()));
    h.dialog.post(UiEvent::DescriptionEdited("farewell soon".into()));
    h.dialog.post(UiEvent::BriefEdited("S/U".into()));
    h.dialog.post(UiEvent::Submit);

    let brief = vec!["S".to_string(), "U".to_string()];
    wait_until("saved entry", || {
        Dictionary::load(&path)
            .ok()
            .and_then(|(saved, _)| saved.lookup(&brief).ok().flatten())
            .is_some()
    });
    assert_eq!(
        dict.lookup(&brief).unwrap(),
        Some(Entry::new("See you", "farewell soon", &["S", "U"]))
    );
}

#[test]
fn conflicting_submit_is_shown_inline() {
    let h = harness(MockHostEngine::default());
    let dict = dictionary("conflict.json", DictionarySettings::default());
    open(&h, &dict);

    h.dialog.post(UiEvent::TranslationEdited("Hi".into()));
    h.dialog.post(UiEvent::DescriptionEdited("greeting".into()));
    h.dialog.post(UiEvent::BriefEdited("H".into()));
    h.dialog.post(UiEvent::Submit);

    wait_until("inline message", || h.view.read(|v| !v.messages.is_empty()));
    assert!(h.view.read(|v| v.messages[0].contains("conflicts")));
    assert_eq!(dict.snapshot().unwrap().len(), 2);
    assert!(h.view.read(|v| v.visible));
}

#[test]
fn brief_feedback_prefers_host_engine_lookup() {
    let engine = MockHostEngine::default().with_mapping(&["K", "P"], "keep");
    let h = harness(engine);
    let dict = dictionary("feedback.json", DictionarySettings::default());
    open(&h, &dict);

    h.dialog.post(UiEvent::BriefEdited("K/P".into()));
    wait_until("engine feedback", || {
        h.view.read(|v| v.feedback == "K/P maps to keep")
    });

    h.dialog.post(UiEvent::BriefEdited("G".into()));
    wait_until("dictionary feedback", || {
        h.view.read(|v| v.feedback == "G maps to Goodbye")
    });
}

#[test]
fn failed_injection_keeps_host_running() {
    let h = harness(MockHostEngine::default());
    h.engine.set_fail_injections(true);
    let dict = dictionary("inject.json", DictionarySettings::default());
    open(&h, &dict);

    h.dialog.post(UiEvent::Pick);
    wait_until("active cleared", || h.manager.active_dictionary().is_none());
    assert!(h.manager.is_connected());
    assert!(h.manager.last_translation().is_none());
    assert!(matches!(
        h.manager.resend_last(),
        Err(ManagerError::NothingToResend)
    ));

    h.engine.set_fail_injections(false);
    open(&h, &dict);
    h.dialog.post(UiEvent::Pick);
    wait_until("injection", || h.engine.injected() == vec!["Hello world"]);
    assert_eq!(h.manager.last_translation().as_deref(), Some("Hello world"));
}

#[test]
fn search_racing_a_pick_does_not_break_the_next_dialog() {
    let h = harness(MockHostEngine::default());
    let dict = dictionary("race.json", DictionarySettings::default());
    open(&h, &dict);

    h.dialog.post(UiEvent::DescriptionEdited("greet".into()));
    h.dialog.post(UiEvent::Pick);
    wait_until("injection", || h.engine.injected() == vec!["Hello world"]);
    // Let the debounced search land after the pick cleared the host.
    std::thread::sleep(Duration::from_millis(150));

    open(&h, &dict);
    std::thread::sleep(Duration::from_millis(100));
    assert!(h.engine.errors().is_empty(), "{:?}", h.engine.errors());
    assert!(h.view.read(|v| v.visible));
    assert!(h.manager.is_showing(&dict));
}

#[test]
fn invalid_pick_is_not_injected() {
    let engine = Arc::new(MockHostEngine::default());
    let (manager, dialog) = raw_dialog(Arc::clone(&engine));
    let dict = dictionary("blank.json", DictionarySettings::default());
    manager.open_dialog(dict).unwrap();

    let args = PickedArgs {
        entry: Some(Entry::new("", "blank output", &[])),
    };
    dialog.call(PICKED, &args).unwrap();

    wait_until("active cleared", || manager.active_dictionary().is_none());
    assert!(engine.injected().is_empty());
    assert!(manager.last_translation().is_none());
}

#[test]
fn edit_translation_updates_store_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("phrases.json");
    let (manager, dialog) = raw_dialog(Arc::new(MockHostEngine::default()));
    let dict = dictionary(path.to_str().unwrap(), DictionarySettings::default());
    manager.open_dialog(Arc::clone(&dict)).unwrap();

    let edit = EditArgs {
        old: Entry::new("Goodbye", "farewell", &["G"]),
        new: Entry::new("See you", "farewell", &["S", "U"]),
    };
    let edited: bool = dialog.request(EDIT_TRANSLATION, &edit, WAIT).unwrap();

    assert!(edited);
    let brief = vec!["S".to_string(), "U".to_string()];
    assert_eq!(dict.lookup(&brief).unwrap(), Some(edit.new.clone()));
    assert_eq!(dict.lookup(&["G".to_string()]).unwrap(), None);
    let (saved, _) = Dictionary::load(&path).unwrap();
    assert_eq!(saved.lookup(&brief).unwrap(), Some(edit.new));
}

#[test]
fn edit_translation_onto_a_used_brief_is_refused() {
    let (manager, dialog) = raw_dialog(Arc::new(MockHostEngine::default()));
    let dict = dictionary("collide.json", DictionarySettings::default());
    manager.open_dialog(Arc::clone(&dict)).unwrap();

    let edit = EditArgs {
        old: Entry::new("Goodbye", "farewell", &["G"]),
        new: Entry::new("Goodbye", "farewell", &["H"]),
    };
    let edited: bool = dialog.request(EDIT_TRANSLATION, &edit, WAIT).unwrap();

    assert!(!edited);
    assert_eq!(
        dict.lookup(&["G".to_string()]).unwrap(),
        Some(Entry::new("Goodbye", "farewell", &["G"]))
    );
}

#[test]
fn edit_translation_of_missing_entry_fails_remotely() {
    let (manager, dialog) = raw_dialog(Arc::new(MockHostEngine::default()));
    let dict = dictionary("missing.json", DictionarySettings::default());
    manager.open_dialog(Arc::clone(&dict)).unwrap();

    let edit = EditArgs {
        old: Entry::new("Nowhere", "absent", &["N"]),
        new: Entry::new("Somewhere", "present", &["S"]),
    };
    let error = dialog
        .request::<_, bool>(EDIT_TRANSLATION, &edit, WAIT)
        .unwrap_err();

    assert!(matches!(error, ChannelError::Remote { ref name, .. } if name == EDIT_TRANSLATION));
    assert_eq!(dict.snapshot().unwrap().len(), 2);
}

#[test]
fn stopping_the_host_ends_the_dialog_process() {
    let h = harness(MockHostEngine::default());
    let dict = dictionary("stop.json", DictionarySettings::default());
    open(&h, &dict);

    h.manager.stop();
    h.dialog.wait();

    assert!(h.view.read(|v| !v.visible));
}
