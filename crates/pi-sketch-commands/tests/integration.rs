//! `/sketch` end-to-end: a real session server, a scripted "browser", and an
//! in-memory host.
//!
//! Run with: `cargo test -p pi-sketch-commands --test integration`

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pi_sketch_commands::opener::UrlOpener;
use pi_sketch_commands::{CommandRegistry, SketchCommand, SketchReport, register_builtin_commands};
use pi_sketch_core::config::SketchConfig;
use pi_sketch_core::host::{Component, Host, KeyToken, NoticeLevel};

#[derive(Default)]
struct TestHost {
    no_ui: bool,
    notices: Mutex<Vec<(String, NoticeLevel)>>,
    editor: Mutex<String>,
    mounted: Mutex<Option<Box<dyn Component>>>,
    shown: Mutex<usize>,
}

impl TestHost {
    fn press(&self, key: KeyToken) {
        if let Some(component) = self.mounted.lock().unwrap().as_mut() {
            component.handle_input(&key);
        }
    }

    fn is_mounted(&self) -> bool {
        self.mounted.lock().unwrap().is_some()
    }

    fn notices(&self) -> Vec<(String, NoticeLevel)> {
        self.notices.lock().unwrap().clone()
    }
}

impl Host for TestHost {
    fn has_ui(&self) -> bool {
        !self.no_ui
    }

    fn notify(&self, message: &str, level: NoticeLevel) {
        self.notices.lock().unwrap().push((message.to_string(), level));
    }

    fn editor_text(&self) -> String {
        self.editor.lock().unwrap().clone()
    }

    fn set_editor_text(&self, text: &str) {
        *self.editor.lock().unwrap() = text.to_string();
    }

    fn show(&self, component: Box<dyn Component>) {
        *self.shown.lock().unwrap() += 1;
        *self.mounted.lock().unwrap() = Some(component);
    }

    fn dismiss(&self) {
        self.mounted.lock().unwrap().take();
    }
}

/// What the scripted browser does once the page URL is opened.
#[derive(Clone, Copy)]
enum Browser {
    Idle,
    Submit(&'static str),
    SubmitTwice(&'static str, &'static str),
    Cancel,
    Broken,
}

struct ScriptedBrowser {
    script: Browser,
    opened: Mutex<Option<String>>,
}

impl ScriptedBrowser {
    fn new(script: Browser) -> Arc<Self> {
        Arc::new(Self {
            script,
            opened: Mutex::new(None),
        })
    }

    fn opened(&self) -> Option<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl UrlOpener for ScriptedBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        *self.opened.lock().unwrap() = Some(url.to_string());
        let base = url.trim_end_matches("/sketch").to_string();
        let script = self.script;
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            let _ = client.get(format!("{base}/sketch")).send().await;
            match script {
                Browser::Idle | Browser::Broken => {}
                Browser::Submit(body) => {
                    let _ = client.post(format!("{base}/submit")).body(body).send().await;
                }
                Browser::SubmitTwice(first, second) => {
                    let _ = client.post(format!("{base}/submit")).body(first).send().await;
                    let _ = client.post(format!("{base}/submit")).body(second).send().await;
                }
                Browser::Cancel => {
                    let _ = client.post(format!("{base}/cancel")).send().await;
                }
            }
        });
        match self.script {
            Browser::Broken => Err(std::io::Error::other("no browser installed")),
            _ => Ok(()),
        }
    }
}

fn config(scratch: &Path, timeout_secs: u64) -> SketchConfig {
    SketchConfig {
        scratch_dir: Some(scratch.to_string_lossy().into_owned()),
        timeout_secs,
        ..SketchConfig::default()
    }
}

fn command(scratch: &Path, timeout_secs: u64, browser: Arc<ScriptedBrowser>) -> SketchCommand {
    SketchCommand::new(config(scratch, timeout_secs)).with_opener(browser)
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

async fn assert_closed(url: &str) {
    let submit = url.replace("/sketch", "/submit");
    let late = reqwest::Client::new()
        .post(submit)
        .body("bGF0ZQ==")
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(late.is_err(), "session server still answering");
}

#[tokio::test]
async fn test_submit_saves_file_and_updates_editor() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = dir.path().join("pi-sketches");
    let browser = ScriptedBrowser::new(Browser::Submit("aGVsbG8="));
    let host = TestHost::default();
    host.set_editor_text("Here is the layout I mean:");

    let report = command(&scratch, 60, browser.clone()).run(&host).await;

    let SketchReport::Saved(path) = report else {
        panic!("expected a saved sketch, got {report:?}");
    };
    assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    assert!(path.starts_with(&scratch));
    assert!(path.to_string_lossy().ends_with(".png"));

    let editor = host.editor_text();
    let line = format!("Sketch: {}", path.display());
    assert_eq!(editor, format!("Here is the layout I mean:\n{line}"));
    assert!(editor.ends_with(".png"));

    assert!(host.notices().is_empty());
    assert_eq!(*host.shown.lock().unwrap(), 1);
    assert!(!host.is_mounted());
    assert_closed(&browser.opened().unwrap()).await;
}

#[tokio::test]
async fn test_duplicate_submit_writes_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let browser = ScriptedBrowser::new(Browser::SubmitTwice("Zmlyc3Q=", "c2Vjb25k"));
    let host = TestHost::default();

    let report = command(dir.path(), 60, browser).run(&host).await;

    let SketchReport::Saved(path) = report else {
        panic!("expected a saved sketch, got {report:?}");
    };
    assert_eq!(std::fs::read(&path).unwrap(), b"first");

    // give a stray second request time to land, if it could
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(files_in(dir.path()), vec![path]);
}

#[tokio::test]
async fn test_browser_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = dir.path().join("pi-sketches");
    let browser = ScriptedBrowser::new(Browser::Cancel);
    let host = TestHost::default();
    host.set_editor_text("untouched");

    let report = command(&scratch, 60, browser).run(&host).await;

    assert_eq!(report, SketchReport::Cancelled);
    assert_eq!(
        host.notices(),
        vec![("Sketch cancelled".to_string(), NoticeLevel::Info)]
    );
    assert!(files_in(&scratch).is_empty());
    assert_eq!(host.editor_text(), "untouched");
}

#[tokio::test]
async fn test_escape_in_host_cancels_and_closes_server() {
    let dir = tempfile::tempdir().unwrap();
    let browser = ScriptedBrowser::new(Browser::Idle);
    let host = TestHost::default();
    let command = command(dir.path(), 60, browser.clone());

    let driver = async {
        while !host.is_mounted() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        host.press(KeyToken::Char('x'));
        host.press(KeyToken::Escape);
    };
    let (report, ()) = tokio::join!(command.run(&host), driver);

    assert_eq!(report, SketchReport::Cancelled);
    assert_eq!(
        host.notices(),
        vec![("Sketch cancelled".to_string(), NoticeLevel::Info)]
    );
    assert!(!host.is_mounted());

    // a late submit from the browser cannot create a file
    assert_closed(&browser.opened().unwrap()).await;
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_abandoned_session_does_not_block_the_next() {
    let dir = tempfile::tempdir().unwrap();
    let browser = ScriptedBrowser::new(Browser::Idle);
    let host = TestHost::default();
    let command = command(dir.path(), 60, browser);

    // the host gives up on the first session without letting it finish
    let abandoned = tokio::time::timeout(Duration::from_millis(200), command.run(&host)).await;
    assert!(abandoned.is_err());

    let driver = async {
        while *host.shown.lock().unwrap() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        host.press(KeyToken::Escape);
    };
    let (report, ()) = tokio::join!(command.run(&host), driver);

    assert_eq!(report, SketchReport::Cancelled);
    assert_eq!(
        host.notices(),
        vec![("Sketch cancelled".to_string(), NoticeLevel::Info)]
    );
}

#[tokio::test]
async fn test_deadline_resolves_as_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let browser = ScriptedBrowser::new(Browser::Idle);
    let host = TestHost::default();

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        command(dir.path(), 1, browser.clone()).run(&host),
    )
    .await
    .expect("deadline never fired");

    assert_eq!(report, SketchReport::Cancelled);
    assert_eq!(host.notices()[0].0, "Sketch cancelled");
    assert_closed(&browser.opened().unwrap()).await;
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_requires_interactive_host() {
    let dir = tempfile::tempdir().unwrap();
    let browser = ScriptedBrowser::new(Browser::Submit("aGVsbG8="));
    let host = TestHost {
        no_ui: true,
        ..TestHost::default()
    };

    let report = command(dir.path(), 60, browser.clone()).run(&host).await;

    assert!(matches!(report, SketchReport::Failed(_)));
    let notices = host.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].1, NoticeLevel::Error);
    assert!(notices[0].0.contains("interactive"));
    assert!(browser.opened().is_none());
    assert_eq!(*host.shown.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_browser_launch_failure_is_silent() {
    let dir = tempfile::tempdir().unwrap();
    let browser = ScriptedBrowser::new(Browser::Broken);
    let host = TestHost::default();
    let command = command(dir.path(), 60, browser);

    let driver = async {
        while !host.is_mounted() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let lines = host.mounted.lock().unwrap().as_ref().unwrap().render(120);
        assert!(lines.iter().any(|l| l.contains("http://127.0.0.1:")));
        host.press(KeyToken::Escape);
    };
    let (report, ()) = tokio::join!(command.run(&host), driver);

    assert_eq!(report, SketchReport::Cancelled);
    assert!(host.notices().iter().all(|(_, level)| *level == NoticeLevel::Info));
}

#[tokio::test]
async fn test_persist_failure_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();
    let browser = ScriptedBrowser::new(Browser::Submit("aGVsbG8="));
    let host = TestHost::default();

    let report = command(&blocker.join("sketches"), 60, browser.clone())
        .run(&host)
        .await;

    assert!(matches!(report, SketchReport::Failed(_)));
    let notices = host.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].1, NoticeLevel::Error);
    assert!(notices[0].0.starts_with("Sketch failed"));
    assert_eq!(host.editor_text(), "");
    assert_closed(&browser.opened().unwrap()).await;
}

#[tokio::test]
async fn test_non_loopback_bind_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let browser = ScriptedBrowser::new(Browser::Idle);
    let host = TestHost::default();
    let config = SketchConfig {
        bind: "0.0.0.0".into(),
        ..config(dir.path(), 60)
    };

    let report = SketchCommand::new(config)
        .with_opener(browser.clone())
        .run(&host)
        .await;

    assert!(matches!(report, SketchReport::Failed(_)));
    assert_eq!(host.notices()[0].1, NoticeLevel::Error);
    assert!(browser.opened().is_none());
}

#[tokio::test]
async fn test_dispatch_through_registry() {
    let dir = tempfile::tempdir().unwrap();
    let browser = ScriptedBrowser::new(Browser::Submit("aGVsbG8="));
    let host = TestHost::default();

    let mut registry = CommandRegistry::new();
    register_builtin_commands(&mut registry, command(dir.path(), 60, browser));
    registry.dispatch("/sketch", &host).await.unwrap();

    assert!(host.editor_text().starts_with("Sketch: "));
    assert_eq!(files_in(dir.path()).len(), 1);
}
