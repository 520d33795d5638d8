//! Forwards `tracing` events from dependencies into the log engine.
//!
//! axum, hyper and tower-http report through `tracing`. [`EngineLayer`] turns
//! each event into an engine record so those lines land in the same sinks,
//! filtered by the same per-sink thresholds.

use std::fmt;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

use super::engine::Logger;
use super::level::LogLevel;

pub struct EngineLayer {
    logger: Logger,
}

impl EngineLayer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl<S: Subscriber> Layer<S> for EngineLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = LogLevel::from(*metadata.level());
        if !self.logger.enabled(level) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut context = visitor.fields;
        context.insert("target".to_string(), Value::String(metadata.target().to_string()));

        self.logger.emit(
            level,
            visitor.message.unwrap_or_default(),
            Some(Value::Object(context)),
        );
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn put(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }
}

/// Install the bridge as the global `tracing` subscriber.
///
/// `RUST_LOG` overrides `default_directive` when set.
pub fn install(logger: Logger, default_directive: &str) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(EngineLayer::new(logger))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{CaptureSink, LevelFilter};

    #[test]
    fn test_events_are_forwarded_with_fields() {
        let sink = CaptureSink::new("capture", LevelFilter::at_least(LogLevel::Info));
        let logger = Logger::from_sinks(vec![Box::new(sink.clone())]);
        let subscriber = tracing_subscriber::registry().with(EngineLayer::new(logger));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(peer = "10.0.0.1", attempts = 3u64, "connection reset");
            tracing::debug!("filtered by the sink");
        });

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level(), LogLevel::Warn);
        assert_eq!(records[0].message(), "connection reset");

        let ctx = records[0].context().unwrap();
        assert_eq!(ctx["peer"], "10.0.0.1");
        assert_eq!(ctx["attempts"], 3);
        assert!(ctx["target"].as_str().unwrap().contains("bridge"));
    }
}
