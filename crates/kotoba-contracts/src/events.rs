use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

pub const OMITTED: &str = "<omitted>";

/// Append-only writer for the pipeline's `events.jsonl`.
///
/// - default fields are `type`, `request_id`, `ts`
/// - caller payload is redacted, then merged last and can override defaults
/// - one compact JSON object per line
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    request_id: String,
    lock: Arc<Mutex<()>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, request_id: impl Into<String>) -> Self {
        Self::with_lock(path.into(), request_id.into(), Arc::new(Mutex::new(())))
    }

    fn with_lock(path: PathBuf, request_id: String, lock: Arc<Mutex<()>>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path,
                request_id,
                lock,
            }),
        }
    }

    /// Same file, new request id. All writers derived from one base share its
    /// append lock, so lines from concurrent requests never interleave.
    pub fn for_request(&self, request_id: impl Into<String>) -> Self {
        Self::with_lock(
            self.inner.path.clone(),
            request_id.into(),
            Arc::clone(&self.inner.lock),
        )
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "request_id".to_string(),
            Value::String(self.inner.request_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            let value = redact_field(&key, &value);
            event.insert(key, value);
        }

        if let Some(parent) = self.inner.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;

        Ok(Value::Object(event))
    }
}

/// Replaces image payloads and credentials with [`OMITTED`], recursively.
pub fn redact_payload(value: &Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::String(text) if text.starts_with("data:") => Value::String(OMITTED.to_string()),
        Value::String(_) => value.clone(),
        Value::Array(rows) => Value::Array(rows.iter().map(redact_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                out.insert(key.clone(), redact_field(key, row));
            }
            Value::Object(out)
        }
    }
}

fn redact_field(key: &str, value: &Value) -> Value {
    let lowered = key.to_ascii_lowercase().replace('-', "_");
    let sensitive = matches!(
        lowered.as_str(),
        "b64_json"
            | "image"
            | "image_bytes"
            | "data"
            | "bitmap"
            | "data_url"
            | "dataurl"
            | "inlinedata"
            | "inline_data"
            | "key"
            | "authorization"
    ) || lowered.contains("api_key")
        || lowered.contains("apikey");
    if sensitive {
        return Value::String(OMITTED.to_string());
    }
    redact_payload(value)
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
