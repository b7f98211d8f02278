//! Opt-in local usage events.
//!
//! Events are queued on a bounded channel and appended as JSON lines by a
//! background writer thread. Nothing leaves the machine.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, OnceLock};

use devhub_util::{data_dir, env_flag, now_millis};
use serde::Serialize;
use tracing::warn;

const EVENT_QUEUE_CAPACITY: usize = 256;
const MAX_EVENT_BYTES: u64 = 2 * 1024 * 1024;
const EVENTS_FILE: &str = "events.jsonl";

pub const TELEMETRY_ENV: &str = "DEVHUB_TELEMETRY";

#[derive(Clone, Debug)]
pub struct TelemetryOptions {
    pub app_name: &'static str,
    pub app_version: &'static str,
    pub enabled: bool,
    /// Where `events.jsonl` lives. Defaults to `<data_dir>/telemetry/<app_name>`.
    pub dir: Option<PathBuf>,
}

pub struct Telemetry {
    app_name: String,
    app_version: String,
    session_id: String,
    enabled: AtomicBool,
    sender: SyncSender<UsageEvent>,
}

#[derive(Debug, Serialize)]
pub struct UsageEvent {
    pub event_type: String,
    pub at_unix_millis: i64,
    pub app: String,
    pub version: String,
    pub session_id: String,
    pub properties: BTreeMap<String, String>,
}

static TELEMETRY: OnceLock<Arc<Telemetry>> = OnceLock::new();

/// Installs the process-wide recorder. A second call only updates the
/// enabled switch of the existing one.
pub fn init(options: TelemetryOptions) -> Arc<Telemetry> {
    if let Some(existing) = TELEMETRY.get() {
        existing.set_enabled(options.enabled);
        return Arc::clone(existing);
    }
    let telemetry = Telemetry::start(options);
    let _ = TELEMETRY.set(Arc::clone(&telemetry));
    telemetry
}

pub fn init_with_env(app_name: &'static str, app_version: &'static str) -> Arc<Telemetry> {
    init(TelemetryOptions {
        app_name,
        app_version,
        enabled: env_flag(TELEMETRY_ENV).unwrap_or(false),
        dir: None,
    })
}

pub fn global() -> Option<Arc<Telemetry>> {
    TELEMETRY.get().map(Arc::clone)
}

pub fn set_enabled(enabled: bool) {
    if let Some(telemetry) = TELEMETRY.get() {
        telemetry.set_enabled(enabled);
    }
}

/// Records an event on the global recorder, if one was installed.
pub fn event(event_type: &str, properties: &[(&str, &str)]) {
    if let Some(telemetry) = TELEMETRY.get() {
        telemetry.record(event_type, properties);
    }
}

impl Telemetry {
    pub fn start(options: TelemetryOptions) -> Arc<Self> {
        let dir = options
            .dir
            .clone()
            .unwrap_or_else(|| data_dir().join("telemetry").join(options.app_name));
        let (sender, receiver) = sync_channel(EVENT_QUEUE_CAPACITY);
        let telemetry = Arc::new(Self {
            app_name: options.app_name.to_string(),
            app_version: options.app_version.to_string(),
            session_id: new_session_id(),
            enabled: AtomicBool::new(options.enabled),
            sender,
        });
        start_writer_thread(dir, receiver);
        telemetry
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn record(&self, event_type: &str, properties: &[(&str, &str)]) {
        if !self.is_enabled() {
            return;
        }
        let event = self.build_event(event_type, properties);
        // A full queue drops the event rather than blocking the caller.
        let _ = self.sender.try_send(event);
    }

    fn build_event(&self, event_type: &str, properties: &[(&str, &str)]) -> UsageEvent {
        let properties = properties
            .iter()
            .filter(|(key, _)| !key.trim().is_empty())
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        UsageEvent {
            event_type: event_type.to_string(),
            at_unix_millis: now_millis(),
            app: self.app_name.clone(),
            version: self.app_version.clone(),
            session_id: self.session_id.clone(),
            properties,
        }
    }
}

fn start_writer_thread(dir: PathBuf, receiver: Receiver<UsageEvent>) {
    std::thread::spawn(move || {
        while let Ok(event) = receiver.recv() {
            if let Err(err) = append_event(&dir, &event) {
                warn!("telemetry: failed to write to {}: {err}", dir.display());
            }
        }
    });
}

pub fn append_event(dir: &Path, event: &UsageEvent) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join(EVENTS_FILE);
    rotate_if_needed(&path, MAX_EVENT_BYTES)?;
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    let line = serde_json::to_string(event).map_err(io::Error::other)?;
    writeln!(file, "{line}")
}

fn rotate_if_needed(path: &Path, max_bytes: u64) -> io::Result<()> {
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() >= max_bytes {
            let rotated = path.with_extension("jsonl.1");
            let _ = fs::remove_file(&rotated);
            fs::rename(path, rotated)?;
        }
    }
    Ok(())
}

fn new_session_id() -> String {
    format!("{:x}-{:x}", now_millis(), std::process::id())
}
