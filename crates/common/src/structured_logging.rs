use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

/// Одна строка JSON лога
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredLogEntry {
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    /// Имя ближайшего span (например `persist_snapshot`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Слой, который пишет каждое событие одной JSON строкой
///
/// По умолчанию пишет в stdout, в тестах можно подставить свой writer.
pub struct JsonLayer<W = fn() -> std::io::Stdout> {
    make_writer: W,
}

impl JsonLayer {
    pub fn stdout() -> Self {
        Self {
            make_writer: std::io::stdout,
        }
    }
}

impl<W> JsonLayer<W>
where
    W: for<'w> MakeWriter<'w> + 'static,
{
    pub fn with_writer(make_writer: W) -> Self {
        Self { make_writer }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let metadata = event.metadata();
        let entry = StructuredLogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level: metadata.level().as_str().to_string(),
            target: metadata.target().to_string(),
            message: fields.message.unwrap_or_default(),
            span: ctx.event_span(event).map(|span| span.name().to_string()),
            fields: fields.values,
        };

        // Ошибки записи лога некуда сообщать
        if let Ok(line) = serde_json::to_string(&entry) {
            let mut writer = self.make_writer.make_writer();
            let _ = writeln!(writer, "{line}");
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: Map<String, Value>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(text) => text,
                other => other.to_string(),
            });
        } else {
            self.values.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN и бесконечности в JSON не представимы
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.put(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }
}

/// Конфигурация логирования для бинарников
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Минимальный уровень, если RUST_LOG не задан
    pub level: Level,
    pub json_output: bool,
    /// Цветной вывод (только для текстового формата)
    pub color_output: bool,
    pub include_line_numbers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_output: false,
            color_output: true,
            include_line_numbers: cfg!(debug_assertions),
        }
    }
}

impl LoggingConfig {
    pub fn json() -> Self {
        Self {
            json_output: true,
            color_output: false,
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }
}

/// Установить глобальный subscriber
///
/// Возвращает ошибку, если subscriber уже установлен.
pub fn init_structured_logging(config: LoggingConfig) -> anyhow::Result<()> {
    let registry = Registry::default().with(config.env_filter());

    if config.json_output {
        tracing::subscriber::set_global_default(registry.with(JsonLayer::stdout()))?;
    } else {
        let text_layer = fmt::layer()
            .with_target(true)
            .with_line_number(config.include_line_numbers)
            .with_ansi(config.color_output)
            .with_span_events(FmtSpan::CLOSE);
        tracing::subscriber::set_global_default(registry.with(text_layer))?;
    }

    Ok(())
}

/// Замер длительности операции с итоговой записью в лог
pub struct OperationTimer {
    started: Instant,
    operation: String,
    context: Map<String, Value>,
}

impl OperationTimer {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            started: Instant::now(),
            operation: operation.into(),
            context: Map::new(),
        }
    }

    pub fn add_field(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(value) = serde_json::to_value(value) {
            self.context.insert(key.into(), value);
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Записать итог операции; возвращает длительность в миллисекундах
    pub fn finish_with_result<T, E: std::fmt::Display>(self, result: &Result<T, E>) -> u64 {
        let duration_ms = self.elapsed_ms();
        let context = Value::Object(self.context);

        match result {
            Ok(_) => tracing::info!(
                operation = %self.operation,
                duration_ms,
                context = %context,
                "Operation completed"
            ),
            Err(err) => tracing::error!(
                operation = %self.operation,
                duration_ms,
                context = %context,
                error = %err,
                "Operation failed"
            ),
        }
        duration_ms
    }
}
