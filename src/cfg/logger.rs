// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, fs, path::Path, sync::Arc};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{Event, Subscriber};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter,
    fmt::{
        self, FmtContext, FormatEvent, FormatFields, FormattedFields,
        format::{FmtSpan, JsonFields, Writer},
    },
    layer::SubscriberExt,
};

use crate::cfg::enums::{LogOutput, RotationFrequency};

#[derive(Debug, Deserialize, Clone)]
pub struct LoggerConfig {
    pub logger: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub level: String,
    pub output: LogOutput,
    #[serde(default)]
    pub is_show_line: bool,
    #[serde(default)]
    pub is_show_module_path: bool,
    #[serde(default)]
    pub is_show_target: bool,
    pub file: Option<LogFileConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogFileConfig {
    pub path: String,
    #[serde(default)]
    pub rotation_frequency: RotationFrequency,
}

impl From<RotationFrequency> for Rotation {
    fn from(r: RotationFrequency) -> Self {
        match r {
            RotationFrequency::Minutely => Rotation::MINUTELY,
            RotationFrequency::Hourly => Rotation::HOURLY,
            RotationFrequency::Daily => Rotation::DAILY,
            RotationFrequency::Never => Rotation::NEVER,
        }
    }
}

impl LoggerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {path:?}"))
    }
}

// One JSON object per event
struct JsonFormatter {
    config: Arc<LogConfig>,
}

impl JsonFormatter {
    fn new(config: Arc<LogConfig>) -> Self {
        Self { config }
    }
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    fields: serde_json::Map<String, serde_json::Value>,
}

impl LogEntry {
    fn new(
        config: &LogConfig,
        event: &Event,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let meta = event.metadata();
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: meta.level().to_string(),
            target: config.is_show_target.then(|| meta.target().to_string()),
            module_path: config
                .is_show_module_path
                .then(|| meta.module_path().unwrap_or("").to_string()),
            line: if config.is_show_line { meta.line() } else { None },
            fields,
        }
    }
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let mut fields = visitor.fields;

        if let Some(scope) = ctx.event_scope() {
            let mut span_names = vec![];
            for span in scope.from_root() {
                span_names.push(span.name().to_string());
                if let Some(ext) = span.extensions().get::<FormattedFields<JsonFields>>()
                {
                    let v: HashMap<String, Value> =
                        serde_json::from_str(&ext.fields).unwrap_or_default();
                    fields.extend(v);
                }
            }
            fields.insert("span_names".to_string(), json!(span_names));
        }

        let log_entry = LogEntry::new(&self.config, event, fields);
        writeln!(
            writer,
            "{}",
            serde_json::to_string(&log_entry).map_err(|_| std::fmt::Error)?
        )
    }
}

#[derive(Default)]
struct JsonVisitor {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl tracing::field::Visit for JsonVisitor {
    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_debug(
        &mut self,
        field: &tracing::field::Field,
        value: &dyn std::fmt::Debug,
    ) {
        self.fields
            .insert(field.name().to_string(), json!(format!("{:?}", value)));
    }
}

/// Splits `dir/name.log` for the rolling appender.
fn split_path(path: &str) -> (String, String) {
    let path = Path::new(path);
    let directory = path
        .parent()
        .and_then(Path::to_str)
        .unwrap_or("")
        .to_string();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string();
    (directory, file_name)
}

/// Installs the global JSON subscriber described by the YAML file at
/// `config_path`. Keep the returned guard alive for the life of the process.
pub fn init_logger(config_path: &str) -> Result<WorkerGuard> {
    let config = LoggerConfig::load_from_file(config_path)?;

    let (writer, guard) = match config.logger.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::File => {
            let cfg = config
                .logger
                .file
                .as_ref()
                .context("Failed to find log config file")?;
            let (directory, file_name) = split_path(&cfg.path);
            let appender =
                RollingFileAppender::new(cfg.rotation_frequency.into(), directory, file_name);
            tracing_appender::non_blocking(appender)
        },
    };

    let subscriber_layer = fmt::layer()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .json()
        .event_format(JsonFormatter::new(Arc::new(config.logger.clone())))
        .fmt_fields(JsonFields::default());

    let env_filter = EnvFilter::try_new(&config.logger.level)
        .context("Failed to parse log level from config")?;

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(subscriber_layer);

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    Ok(guard)
}
