//! Immutable log records and their line layouts.

use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::level::LogLevel;

/// Line layout used by a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// `2025-01-15 10:00:00.123 [INFO] message {"key":"value"}`
    #[default]
    Text,
    /// One JSON object per line, context flattened into the top level.
    Json,
}

/// A single log event. Built once by the engine and shared by every sink.
#[derive(Debug, Clone)]
pub struct LogRecord {
    level: LogLevel,
    message: String,
    context: Option<Map<String, Value>>,
    timestamp: DateTime<Local>,
}

impl LogRecord {
    /// Create a record stamped with the current local time.
    ///
    /// Non-object context values are wrapped as `{"value": ...}`; `null` and
    /// empty objects are dropped.
    pub fn new(level: LogLevel, message: impl Into<String>, context: Option<Value>) -> Self {
        let context = match context {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) if map.is_empty() => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Some(map)
            }
        };

        Self {
            level,
            message: message.into(),
            context,
            timestamp: Local::now(),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> Option<&Map<String, Value>> {
        self.context.as_ref()
    }

    /// Render the record as a single line (no trailing newline).
    pub fn render(&self, format: LogFormat) -> String {
        match format {
            LogFormat::Text => self.render_text(false),
            LogFormat::Json => self.render_json(),
        }
    }

    /// Text layout with an ANSI-colored level tag, for terminals.
    pub fn render_colored(&self) -> String {
        self.render_text(true)
    }

    fn render_text(&self, colored: bool) -> String {
        let ts = self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let mut line = if colored {
            format!(
                "\x1b[{}m{} [{}]\x1b[0m {}",
                ansi_color(self.level),
                ts,
                self.level.label(),
                self.message
            )
        } else {
            format!("{} [{}] {}", ts, self.level.label(), self.message)
        };

        if let Some(ctx) = &self.context {
            line.push(' ');
            line.push_str(&Value::Object(ctx.clone()).to_string());
        }
        line
    }

    fn render_json(&self) -> String {
        let mut obj = Map::new();
        obj.insert(
            "timestamp".to_string(),
            Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false)),
        );
        obj.insert("level".to_string(), Value::String(self.level.as_str().to_string()));
        obj.insert("message".to_string(), Value::String(self.message.clone()));
        if let Some(ctx) = &self.context {
            for (k, v) in ctx {
                // reserved keys win
                obj.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        Value::Object(obj).to_string()
    }
}

fn ansi_color(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "34",
        LogLevel::Debug => "36",
        LogLevel::Info => "32",
        LogLevel::Warn => "33",
        LogLevel::Error => "31",
        LogLevel::Fatal => "35",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_layout() {
        let record = LogRecord::new(LogLevel::Warn, "disk almost full", Some(json!({"used": 91})));
        let line = record.render(LogFormat::Text);
        assert!(line.contains(" [WARN] disk almost full "));
        assert!(line.ends_with(r#"{"used":91}"#));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_text_layout_keeps_message_ahead_of_context() {
        let record = LogRecord::new(
            LogLevel::Info,
            "user created",
            Some(json!({"message": "spoofed", "stack": "at nowhere"})),
        );
        let line = record.render(LogFormat::Text);
        let (head, context) = line.split_once(" {").unwrap();
        assert!(head.ends_with(" [INFO] user created"));
        assert!(context.contains(r#""message":"spoofed""#));
        assert!(record.render_colored().contains("\x1b[0m user created {"));
    }

    #[test]
    fn test_json_layout_flattens_context() {
        let record = LogRecord::new(
            LogLevel::Info,
            "request started",
            Some(json!({"correlationId": "abc", "message": "shadowed"})),
        );
        let parsed: Value = serde_json::from_str(&record.render(LogFormat::Json)).unwrap();
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["message"], "request started");
        assert_eq!(parsed["correlationId"], "abc");
        assert!(parsed["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_context_normalization() {
        assert!(LogRecord::new(LogLevel::Info, "m", None).context().is_none());
        assert!(LogRecord::new(LogLevel::Info, "m", Some(Value::Null)).context().is_none());
        assert!(LogRecord::new(LogLevel::Info, "m", Some(json!({}))).context().is_none());

        let wrapped = LogRecord::new(LogLevel::Info, "m", Some(json!(42)));
        assert_eq!(wrapped.context().unwrap()["value"], 42);
    }
}
