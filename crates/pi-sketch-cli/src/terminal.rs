//! Terminal host: draws status views on stderr and feeds them key presses.

use std::io::{self, IsTerminal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use dialoguer::console::{style, Key, Term};
use tracing::debug;

use pi_sketch_core::host::{Component, Host, KeyToken, NoticeLevel};

use crate::tty;

const DEFAULT_WIDTH: usize = 80;

/// How often an idle key reader checks whether it should stop.
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Where key presses come from.
pub(crate) trait KeySource: Send {
    /// Wait up to `timeout` for a key. `Ok(None)` means nothing arrived.
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<Key>>;
}

/// Keys typed on the controlling terminal.
struct TtyKeys(Term);

impl KeySource for TtyKeys {
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<Key>> {
        if !tty::wait_readable(timeout)? {
            return Ok(None);
        }
        self.0.read_key().map(Some)
    }
}

/// Mounted view plus how many lines it currently occupies on screen.
#[derive(Default)]
struct View {
    component: Option<Box<dyn Component>>,
    drawn: usize,
}

struct KeyReader {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct TerminalHost {
    term: Term,
    interactive: bool,
    owns_tty: bool,
    editor: Mutex<String>,
    view: Arc<Mutex<View>>,
    keys: Arc<Mutex<Box<dyn KeySource>>>,
    reader: Mutex<Option<KeyReader>>,
    tty_mode: Mutex<Option<tty::SavedMode>>,
}

impl TerminalHost {
    /// A host whose composition buffer starts out as `initial`.
    pub fn new(initial: String) -> Self {
        let term = Term::stderr();
        let interactive = term.is_term() && std::io::stdin().is_terminal();
        let keys = Box::new(TtyKeys(term.clone()));
        Self::build(term, interactive, interactive, initial, keys)
    }

    fn build(
        term: Term,
        interactive: bool,
        owns_tty: bool,
        initial: String,
        keys: Box<dyn KeySource>,
    ) -> Self {
        Self {
            term,
            interactive,
            owns_tty,
            editor: Mutex::new(initial),
            view: Arc::new(Mutex::new(View::default())),
            keys: Arc::new(Mutex::new(keys)),
            reader: Mutex::new(None),
            tty_mode: Mutex::new(None),
        }
    }

    fn start_key_reader(&self) {
        if self.owns_tty {
            let mut mode = lock(&self.tty_mode);
            if mode.is_none() {
                match tty::SavedMode::enter() {
                    Ok(saved) => *mode = Some(saved),
                    Err(e) => debug!(error = %e, "Could not switch terminal to key input"),
                }
            }
        }

        let term = self.term.clone();
        let view = self.view.clone();
        let keys = self.keys.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = stop.clone();

        let handle = std::thread::spawn(move || {
            let mut keys = lock(&keys);
            while !stopped.load(Ordering::SeqCst) {
                let key = match keys.next_key(KEY_POLL_INTERVAL) {
                    Ok(Some(key)) => key,
                    Ok(None) => continue,
                    Err(e) => {
                        debug!(error = %e, "Key reader stopped");
                        break;
                    }
                };
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                let mut view = lock(&view);
                let Some(component) = view.component.as_mut() else {
                    break;
                };
                component.handle_input(&key_token(key));
                redraw(&term, &mut view);
            }
        });
        *lock(&self.reader) = Some(KeyReader { stop, handle });
    }

    /// Stop the key reader and wait for it, so no read is in flight afterwards.
    fn stop_key_reader(&self) {
        let Some(reader) = lock(&self.reader).take() else {
            return;
        };
        reader.stop.store(true, Ordering::SeqCst);
        if reader.handle.join().is_err() {
            debug!("Key reader panicked");
        }
    }

    /// Stop reading keys and give the terminal back its previous mode.
    fn release_terminal(&self) {
        self.stop_key_reader();
        lock(&self.tty_mode).take();
    }
}

impl Host for TerminalHost {
    fn has_ui(&self) -> bool {
        self.interactive
    }

    fn notify(&self, message: &str, level: NoticeLevel) {
        let line = match level {
            NoticeLevel::Info => style(message).cyan().to_string(),
            NoticeLevel::Warning => style(message).yellow().to_string(),
            NoticeLevel::Error => style(message).red().bold().to_string(),
        };
        let _ = self.term.write_line(&line);
    }

    fn editor_text(&self) -> String {
        lock(&self.editor).clone()
    }

    fn set_editor_text(&self, text: &str) {
        *lock(&self.editor) = text.to_string();
    }

    fn show(&self, component: Box<dyn Component>) {
        self.stop_key_reader();
        {
            let mut view = lock(&self.view);
            view.component = Some(component);
            redraw(&self.term, &mut view);
        }
        if self.interactive {
            self.start_key_reader();
        }
    }

    fn dismiss(&self) {
        self.release_terminal();
        let mut view = lock(&self.view);
        if view.component.take().is_some() {
            let _ = self.term.clear_last_lines(view.drawn);
            view.drawn = 0;
        }
    }
}

impl Drop for TerminalHost {
    fn drop(&mut self) {
        self.release_terminal();
    }
}

fn redraw(term: &Term, view: &mut View) {
    let Some(component) = view.component.as_ref() else {
        return;
    };
    let width = match term.size_checked() {
        Some((_, cols)) if cols > 0 => cols as usize,
        _ => DEFAULT_WIDTH,
    };
    let lines = component.render(width);

    if view.drawn > 0 {
        let _ = term.clear_last_lines(view.drawn);
    }
    for line in &lines {
        let _ = term.write_line(line);
    }
    view.drawn = lines.len();
}

fn key_token(key: Key) -> KeyToken {
    match key {
        Key::Escape => KeyToken::Escape,
        Key::Enter => KeyToken::Enter,
        Key::Char(c) => KeyToken::Char(c),
        other => KeyToken::Other(format!("{other:?}")),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
