//! Custom tracing layers

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use payroute_core::SimTime;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::config::JsonlConfig;
use crate::context::NodeContextGuard;
use crate::correlation::fields;

/// JSONL formatting layer writing to `writer`
pub fn jsonl_layer<S, W>(
    writer: W,
    config: &JsonlConfig,
) -> tracing_subscriber::fmt::Layer<S, JsonFields, Format<Json>, W>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(config.current_span)
        .with_span_list(config.span_list)
        .flatten_event(config.flatten_events)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_writer(writer)
}

/// One event recorded by [`CaptureLayer`]
#[derive(Debug, Clone, Serialize)]
pub struct CapturedEvent {
    pub level: String,
    pub target: String,
    /// Node context active when the event fired
    pub node: Option<String>,
    pub sim_time: Option<SimTime>,
    pub fields: Map<String, Value>,
}

impl CapturedEvent {
    pub fn message(&self) -> Option<&str> {
        self.fields.get(fields::MESSAGE).and_then(Value::as_str)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Shared in-memory event buffer
///
/// Cloning shares the buffer, so a test or scenario keeps one handle while
/// the subscriber owns the layer.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer {
            events: Arc::clone(&self.events),
        }
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// Messages logged while `node` was the active context, in order
    pub fn messages_for(&self, node: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.node.as_deref() == Some(node))
            .filter_map(|event| event.message().map(str::to_string))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Render the buffer as JSON lines
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let events = self.events.lock();
        let mut out = String::new();
        for event in events.iter() {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}

/// Layer that appends every event, tagged with the node context, to a
/// [`LogCapture`]
pub struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorded = Map::new();
        event.record(&mut JsonVisitor(&mut recorded));

        let context = NodeContextGuard::current();
        let metadata = event.metadata();
        self.events.lock().push(CapturedEvent {
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            node: context.as_ref().map(|ctx| ctx.node_id.clone()),
            sim_time: context.and_then(|ctx| ctx.sim_time),
            fields: recorded,
        });
    }
}

struct JsonVisitor<'a>(&'a mut Map<String, Value>);

impl Visit for JsonVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0
            .insert(field.name().to_string(), Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }
}
