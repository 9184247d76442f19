use std::collections::HashMap;
use std::io::IsTerminal;
use std::io::stdout;
use std::str::FromStr;

use anyhow::Context;
use anyhow::anyhow;
use clap::Parser;
use display_json::DebugAsJson;
use itertools::Itertools;
use opentelemetry::KeyValue;
use opentelemetry_otlp::Protocol;
use opentelemetry_otlp::SpanExporterBuilder;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource as SdkResource;
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace;
use opentelemetry_sdk::trace::BatchConfigBuilder;
use opentelemetry_sdk::trace::Tracer as SdkTracer;
use tonic::metadata::MetadataKey;
use tonic::metadata::MetadataMap;
use tonic::metadata::MetadataValue;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::infra::build_info;
use crate::infra::sentry::SentryConfig;
use crate::infra::tracing::TracingContextLayer;
use crate::infra::tracing::TracingJsonFormatter;
use crate::infra::tracing::TracingMinimalTimer;

// -----------------------------------------------------------------------------
// Config
// -----------------------------------------------------------------------------

#[derive(DebugAsJson, Clone, Parser, serde::Serialize)]
pub struct TracingConfig {
    /// OpenTelemetry server URL.
    #[arg(long = "tracing-url", alias = "tracing-collector-url", env = "TRACING_URL")]
    pub tracing_url: Option<String>,

    /// OpenTelemetry server communication protocol.
    #[arg(long = "tracing-protocol", env = "TRACING_PROTOCOL", default_value = "grpc")]
    pub tracing_protocol: TracingProtocol,

    /// OpenTelemetry additional HTTP headers or GRPC metadata.
    #[arg(long = "tracing-headers", env = "TRACING_HEADERS", value_delimiter = ',')]
    pub tracing_headers: Vec<String>,

    /// How tracing events will be formatted when displayed in stdout.
    #[arg(long = "tracing-log-format", env = "TRACING_LOG_FORMAT", default_value = "normal")]
    pub tracing_log_format: TracingLogFormat,

    /// Filter directives used when `RUST_LOG` is not set.
    #[arg(long = "tracing-default-filter", env = "TRACING_DEFAULT_FILTER", default_value = "info")]
    pub tracing_default_filter: String,
}

impl TracingConfig {
    /// Inits application global tracing registry.
    ///
    /// Uses println! to have information available in stdout before tracing is initialized.
    pub fn init(&self, sentry_config: &Option<SentryConfig>) -> anyhow::Result<()> {
        let subscriber = match self.create_subscriber(sentry_config) {
            Ok(subscriber) => subscriber,
            Err(e) => {
                println!("failed to create tracing subscriber | reason={:?}", e);
                return Err(e);
            }
        };
        match subscriber.try_init() {
            Ok(()) => Ok(()),
            Err(e) => {
                println!("failed to create tracing registry | reason={:?}", e);
                Err(e.into())
            }
        }
    }

    pub fn create_subscriber(&self, sentry_config: &Option<SentryConfig>) -> anyhow::Result<impl SubscriberInitExt + use<>> {
        println!("creating tracing registry");

        // configure tracing context layer
        println!("tracing registry: enabling tracing context recorder");
        let tracing_context_layer = TracingContextLayer.with_filter(self.env_filter());

        // configure stdout log layer
        let enable_ansi = stdout().is_terminal();
        println!(
            "tracing registry: enabling console logs | format={} ansi={}",
            self.tracing_log_format, enable_ansi
        );
        let stdout_layer = match self.tracing_log_format {
            TracingLogFormat::Json => fmt::Layer::default().event_format(TracingJsonFormatter).with_filter(self.env_filter()).boxed(),
            TracingLogFormat::Minimal => fmt::Layer::default()
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_target(false)
                .with_ansi(enable_ansi)
                .with_timer(TracingMinimalTimer)
                .with_filter(self.env_filter())
                .boxed(),
            TracingLogFormat::Normal => fmt::Layer::default().with_ansi(enable_ansi).with_filter(self.env_filter()).boxed(),
            TracingLogFormat::Verbose => fmt::Layer::default()
                .with_ansi(enable_ansi)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_filter(self.env_filter())
                .boxed(),
        };

        // configure opentelemetry layer
        let opentelemetry_layer = match &self.tracing_url {
            Some(url) => {
                let tracer = opentelemetry_tracer(url, self.tracing_protocol, &self.tracing_headers)?;
                let layer = tracing_opentelemetry::layer()
                    .with_tracked_inactivity(false)
                    .with_tracer(tracer)
                    .with_filter(self.env_filter());
                Some(layer)
            }
            None => {
                println!("tracing registry: skipping opentelemetry exporter");
                None
            }
        };

        // configure sentry layer
        let sentry_layer = match &sentry_config {
            Some(sentry_config) => {
                println!("tracing registry: enabling sentry exporter | url={}", sentry_config.sentry_url);
                let layer = sentry_tracing::layer()
                    .event_filter(crate::infra::sentry::sentry_event_filter)
                    .span_filter(crate::infra::sentry::sentry_span_filter)
                    .with_filter(self.env_filter());
                Some(layer)
            }
            None => {
                println!("tracing registry: skipping sentry exporter");
                None
            }
        };

        Ok(tracing_subscriber::registry()
            .with(tracing_context_layer)
            .with(stdout_layer)
            .with(opentelemetry_layer)
            .with(sentry_layer))
    }

    /// Filter from `RUST_LOG`, falling back to the configured default directives.
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.tracing_default_filter))
    }
}

/// Splits `key=value` header definitions. Values may contain `=`.
fn parse_headers(headers: &[String]) -> Vec<(&str, &str)> {
    headers
        .iter()
        .filter_map(|header| {
            let mut parts = header.splitn(2, '=');
            let key = parts.next()?.trim();
            let value = parts.next().unwrap_or_default().trim();
            if key.is_empty() { None } else { Some((key, value)) }
        })
        .collect_vec()
}

fn opentelemetry_tracer(url: &str, protocol: TracingProtocol, headers: &[String]) -> anyhow::Result<SdkTracer> {
    println!(
        "tracing registry: enabling opentelemetry exporter | url={} protocol={} headers={} service={}",
        url,
        protocol,
        headers.len(),
        build_info::service_name()
    );

    let headers = parse_headers(headers);

    // configure tracer
    let tracer_exporter: SpanExporterBuilder = match protocol {
        TracingProtocol::Grpc => {
            let mut protocol_metadata = MetadataMap::new();
            for (key, value) in headers {
                let key = MetadataKey::from_str(key).with_context(|| format!("invalid tracing header name: {key}"))?;
                let value = MetadataValue::from_str(value).with_context(|| format!("invalid tracing header value for {key}"))?;
                protocol_metadata.insert(key, value);
            }

            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_protocol(Protocol::Grpc)
                .with_endpoint(url)
                .with_metadata(protocol_metadata)
                .into()
        }
        TracingProtocol::HttpBinary | TracingProtocol::HttpJson => {
            let protocol_headers: HashMap<String, String> = headers.into_iter().map(|(key, value)| (key.to_owned(), value.to_owned())).collect();

            opentelemetry_otlp::new_exporter()
                .http()
                .with_protocol(protocol.into())
                .with_endpoint(url)
                .with_headers(protocol_headers)
                .into()
        }
    };

    let tracer_config = trace::config().with_resource(SdkResource::new(vec![KeyValue::new("service.name", build_info::service_name())]));

    // configure pipeline
    let batch_config = BatchConfigBuilder::default().with_max_queue_size(u16::MAX as usize).build();
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(tracer_exporter)
        .with_trace_config(tracer_config)
        .with_batch_config(batch_config)
        .install_batch(runtime::Tokio)
        .context("failed to install opentelemetry tracer")
}

// -----------------------------------------------------------------------------
// Protocol
// -----------------------------------------------------------------------------

#[derive(DebugAsJson, strum::Display, Clone, Copy, Eq, PartialEq, serde::Serialize)]
pub enum TracingProtocol {
    #[serde(rename = "grpc")]
    #[strum(to_string = "grpc")]
    Grpc,

    #[serde(rename = "http-binary")]
    #[strum(to_string = "http-binary")]
    HttpBinary,

    #[serde(rename = "http-json")]
    #[strum(to_string = "http-json")]
    HttpJson,
}

impl FromStr for TracingProtocol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self, Self::Err> {
        match s.to_lowercase().trim() {
            "grpc" => Ok(Self::Grpc),
            "http-binary" => Ok(Self::HttpBinary),
            "http-json" => Ok(Self::HttpJson),
            s => Err(anyhow!("unknown tracing protocol: {}", s)),
        }
    }
}

impl From<TracingProtocol> for Protocol {
    fn from(value: TracingProtocol) -> Self {
        match value {
            TracingProtocol::Grpc => Self::Grpc,
            TracingProtocol::HttpBinary => Self::HttpBinary,
            TracingProtocol::HttpJson => Self::HttpJson,
        }
    }
}

// -----------------------------------------------------------------------------
// LogFormat
// -----------------------------------------------------------------------------

/// Tracing event log format.
#[derive(DebugAsJson, strum::Display, Clone, Copy, Eq, PartialEq, serde::Serialize)]
pub enum TracingLogFormat {
    /// Minimal format: Time (no date), level, and message.
    #[serde(rename = "minimal")]
    #[strum(to_string = "minimal")]
    Minimal,

    /// Normal format: Default `tracing` crate configuration.
    #[serde(rename = "normal")]
    #[strum(to_string = "normal")]
    Normal,

    /// Verbose format: Full datetime, level, thread, target, and message.
    #[serde(rename = "verbose")]
    #[strum(to_string = "verbose")]
    Verbose,

    /// JSON format: Verbose information formatted as JSON.
    #[serde(rename = "json")]
    #[strum(to_string = "json")]
    Json,
}

impl FromStr for TracingLogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self, Self::Err> {
        match s.to_lowercase().trim() {
            "json" => Ok(Self::Json),
            "minimal" => Ok(Self::Minimal),
            "normal" => Ok(Self::Normal),
            "verbose" | "full" => Ok(Self::Verbose),
            s => Err(anyhow!("unknown log format: {}", s)),
        }
    }
}
