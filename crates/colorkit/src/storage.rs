//! Settings persistence.
//!
//! The engines only see the [`SettingsStore`] contract: read everything,
//! merge an update, hear about changes, plus the task color map and the
//! subscription flag. Two stores implement it:
//!
//!   - [`MemorySettingsStore`]: in-process, change events fire synchronously
//!   - [`FileSettingsStore`]: a JSON document on disk, watched for external
//!     edits on a background thread and dispatched on [`FileSettingsStore::poll_changes`]
//!
//! A change that carries no new value (the key vanished, the file is
//! unreadable) is never reported. Reporting it would make listeners fall back
//! to defaults and clobber the user's state.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use colorkit_core::settings::merge_values;
use colorkit_core::{Error, Result};
use notify_debouncer_mini::{DebounceEventResult, new_debouncer, notify::RecursiveMode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::callbacks::{CallbackId, Callbacks};

/// Debounce interval (in ms) for file change events. Editors often write a
/// file in several steps; this batches them into one reload.
const FILE_CHANGE_DEBOUNCE_MS: u64 = 300;

/// Poll period of the watcher thread's shutdown flag.
const SHUTDOWN_POLL_MS: u64 = 200;

/// Persisted `taskId -> hex` map.
pub type TaskColorMap = BTreeMap<String, String>;

/// What changed in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    /// The full settings object after the change.
    Settings(Value),
    TaskColors(TaskColorMap),
    Subscription(bool),
}

/// Contract the engines consume.
pub trait SettingsStore {
    /// The whole settings object. `Value::Null` when nothing is stored yet.
    fn get_all(&self) -> Value;

    /// Deep-merge `patch` into the settings (schedules are replaced).
    fn merge(&self, patch: Value) -> Result<()>;

    fn on_change(&self, callback: Box<dyn Fn(&StoreChange)>) -> CallbackId;
    fn remove_listener(&self, id: CallbackId);

    fn task_colors(&self) -> TaskColorMap;
    fn save_task_colors(&self, colors: &TaskColorMap) -> Result<()>;

    /// Whether the paid features are unlocked.
    fn subscription_active(&self) -> bool;

    /// Set one top-level key.
    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut patch = Map::new();
        patch.insert(key.to_string(), value);
        self.merge(Value::Object(patch))
    }
}

/// On-disk and in-memory document shape.
///
/// Every field is optional so a missing key reads as "no value" rather than
/// as an empty default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_colors: Option<TaskColorMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_active: Option<bool>,
}

impl StoredDocument {
    /// Adopt the values `incoming` carries, returning the resulting changes.
    /// Absent or unchanged values produce nothing.
    fn absorb(&mut self, incoming: StoredDocument) -> Vec<StoreChange> {
        let mut changes = Vec::new();
        if let Some(settings) = incoming.settings
            && self.settings.as_ref() != Some(&settings)
        {
            self.settings = Some(settings.clone());
            changes.push(StoreChange::Settings(settings));
        }
        if let Some(colors) = incoming.task_colors
            && self.task_colors.as_ref() != Some(&colors)
        {
            self.task_colors = Some(colors.clone());
            changes.push(StoreChange::TaskColors(colors));
        }
        if let Some(active) = incoming.subscription_active
            && self.subscription_active != Some(active)
        {
            self.subscription_active = Some(active);
            changes.push(StoreChange::Subscription(active));
        }
        changes
    }

    fn merge_settings(&mut self, patch: Value) -> Value {
        let mut settings = self
            .settings
            .take()
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(Map::new()));
        merge_values(&mut settings, patch);
        self.settings = Some(settings.clone());
        settings
    }
}

/// Read a stored document from disk.
pub fn load_document(path: &Path) -> Result<StoredDocument> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

// ===== Memory store =====

/// Store held in memory. Change callbacks fire before the mutating call
/// returns.
#[derive(Default)]
pub struct MemorySettingsStore {
    document: RefCell<StoredDocument>,
    callbacks: Callbacks<StoreChange>,
    task_color_reads: Cell<usize>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: StoredDocument) -> Self {
        Self {
            document: RefCell::new(document),
            ..Default::default()
        }
    }

    pub fn with_settings(settings: Value) -> Self {
        Self::with_document(StoredDocument {
            settings: Some(settings),
            task_colors: None,
            subscription_active: Some(true),
        })
    }

    /// Apply a change made elsewhere (another tab, the options page).
    pub fn apply_external(&self, incoming: StoredDocument) {
        let changes = self.document.borrow_mut().absorb(incoming);
        for change in changes {
            self.callbacks.notify(&change);
        }
    }

    pub fn set_subscription_active(&self, active: bool) {
        self.apply_external(StoredDocument {
            subscription_active: Some(active),
            ..Default::default()
        });
    }

    /// How many times the task color map has been read.
    pub fn task_color_reads(&self) -> usize {
        self.task_color_reads.get()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get_all(&self) -> Value {
        self.document.borrow().settings.clone().unwrap_or(Value::Null)
    }

    fn merge(&self, patch: Value) -> Result<()> {
        let settings = self.document.borrow_mut().merge_settings(patch);
        self.callbacks.notify(&StoreChange::Settings(settings));
        Ok(())
    }

    fn on_change(&self, callback: Box<dyn Fn(&StoreChange)>) -> CallbackId {
        self.callbacks.register(callback)
    }

    fn remove_listener(&self, id: CallbackId) {
        self.callbacks.unregister(id);
    }

    fn task_colors(&self) -> TaskColorMap {
        self.task_color_reads.set(self.task_color_reads.get() + 1);
        self.document.borrow().task_colors.clone().unwrap_or_default()
    }

    fn save_task_colors(&self, colors: &TaskColorMap) -> Result<()> {
        self.apply_external(StoredDocument {
            task_colors: Some(colors.clone()),
            ..Default::default()
        });
        Ok(())
    }

    fn subscription_active(&self) -> bool {
        self.document.borrow().subscription_active.unwrap_or(false)
    }
}

// ===== File store =====

/// Messages sent from the watcher thread to the owning thread.
#[derive(Debug)]
enum WatchMessage {
    Reloaded(Box<StoredDocument>),
    Error(String),
}

/// JSON file store with live reload.
pub struct FileSettingsStore {
    path: PathBuf,
    document: RefCell<StoredDocument>,
    callbacks: Callbacks<StoreChange>,
    /// Text of our own last write, so the watcher can ignore it.
    last_written: Arc<Mutex<Option<String>>>,
    shutdown_flag: Arc<AtomicBool>,
    sender: Sender<WatchMessage>,
    receiver: Receiver<WatchMessage>,
}

impl FileSettingsStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        let document = if path.exists() {
            load_document(path)?
        } else {
            info!("FileSettingsStore: {} does not exist yet", path.display());
            StoredDocument::default()
        };
        let (sender, receiver) = mpsc::channel();
        Ok(Self {
            path: path.to_path_buf(),
            document: RefCell::new(document),
            callbacks: Callbacks::new(),
            last_written: Arc::new(Mutex::new(None)),
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            sender,
            receiver,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> StoredDocument {
        self.document.borrow().clone()
    }

    fn write(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&*self.document.borrow())?;
        *self.last_written.lock() = Some(text.clone());
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &text)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("FileSettingsStore: wrote {}", self.path.display());
        Ok(())
    }

    /// Spawn the watcher thread. Changes queue up until [`poll_changes`].
    ///
    /// [`poll_changes`]: FileSettingsStore::poll_changes
    pub fn start_watching(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .canonicalize()?;
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| Error::Io(std::io::Error::other("settings path has no file name")))?
            .to_owned();
        let watched = dir.join(file_name);

        self.shutdown_flag.store(false, Ordering::Relaxed);
        let shutdown_flag = self.shutdown_flag.clone();
        let last_written = self.last_written.clone();
        let sender = self.sender.clone();

        info!("FileSettingsStore: watching {}", watched.display());
        thread::spawn(move || {
            run_file_watcher(dir, watched, last_written, sender, shutdown_flag);
        });
        Ok(())
    }

    pub fn stop_watching(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
        debug!("FileSettingsStore: watcher stopped");
    }

    /// Dispatch changes the watcher picked up. Returns how many change
    /// events fired.
    pub fn poll_changes(&self) -> usize {
        let mut fired = 0;
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                WatchMessage::Reloaded(incoming) => {
                    let changes = self.document.borrow_mut().absorb(*incoming);
                    for change in changes {
                        self.callbacks.notify(&change);
                        fired += 1;
                    }
                }
                WatchMessage::Error(err) => {
                    // Keep the last good document.
                    warn!("FileSettingsStore: reload failed: {err}");
                }
            }
        }
        fired
    }
}

impl Drop for FileSettingsStore {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

/// Watcher loop, runs on its own thread until `shutdown_flag` is set.
fn run_file_watcher(
    dir: PathBuf,
    watched: PathBuf,
    last_written: Arc<Mutex<Option<String>>>,
    sender: Sender<WatchMessage>,
    shutdown_flag: Arc<AtomicBool>,
) {
    let debounce_duration = Duration::from_millis(FILE_CHANGE_DEBOUNCE_MS);
    let path_for_handler = watched.clone();

    let mut debouncer = match new_debouncer(debounce_duration, move |res: DebounceEventResult| {
        match res {
            Ok(events) => {
                if !events.iter().any(|e| e.path == path_for_handler) {
                    return;
                }
                let text = match std::fs::read_to_string(&path_for_handler) {
                    Ok(text) => text,
                    Err(e) => {
                        let _ = sender.send(WatchMessage::Error(e.to_string()));
                        return;
                    }
                };
                if last_written.lock().as_deref() == Some(text.as_str()) {
                    debug!("FileSettingsStore: ignoring our own write");
                    return;
                }
                let message = match serde_json::from_str::<StoredDocument>(&text) {
                    Ok(document) => WatchMessage::Reloaded(Box::new(document)),
                    Err(e) => WatchMessage::Error(e.to_string()),
                };
                let _ = sender.send(message);
            }
            Err(err) => error!("FileSettingsStore: watcher error: {err}"),
        }
    }) {
        Ok(d) => d,
        Err(e) => {
            error!("FileSettingsStore: failed to create watcher: {e}");
            return;
        }
    };

    if let Err(e) = debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive) {
        error!("FileSettingsStore: failed to watch {}: {e}", dir.display());
        return;
    }

    while !shutdown_flag.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(SHUTDOWN_POLL_MS));
    }
    debug!("FileSettingsStore: watcher thread shutting down");
}

impl SettingsStore for FileSettingsStore {
    fn get_all(&self) -> Value {
        self.document.borrow().settings.clone().unwrap_or(Value::Null)
    }

    fn merge(&self, patch: Value) -> Result<()> {
        let settings = self.document.borrow_mut().merge_settings(patch);
        self.write()?;
        self.callbacks.notify(&StoreChange::Settings(settings));
        Ok(())
    }

    fn on_change(&self, callback: Box<dyn Fn(&StoreChange)>) -> CallbackId {
        self.callbacks.register(callback)
    }

    fn remove_listener(&self, id: CallbackId) {
        self.callbacks.unregister(id);
    }

    fn task_colors(&self) -> TaskColorMap {
        self.document.borrow().task_colors.clone().unwrap_or_default()
    }

    fn save_task_colors(&self, colors: &TaskColorMap) -> Result<()> {
        let changes = self.document.borrow_mut().absorb(StoredDocument {
            task_colors: Some(colors.clone()),
            ..Default::default()
        });
        self.write()?;
        for change in changes {
            self.callbacks.notify(&change);
        }
        Ok(())
    }

    fn subscription_active(&self) -> bool {
        self.document.borrow().subscription_active.unwrap_or(false)
    }
}
