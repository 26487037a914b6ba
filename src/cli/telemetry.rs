//! Log output and optional OTLP span export.
//!
//! Spans are exported only when `OTEL_EXPORTER_OTLP_ENDPOINT` is set. Only the
//! gRPC transport is supported.

use anyhow::{anyhow, Result};
use base64ct::{Base64, Encoding};
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{SdkTracerProvider, Tracer},
    Resource,
};
use std::{env::var, sync::OnceLock, time::Duration};
use tonic::{
    metadata::{Ascii, Binary, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{debug, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use ulid::Ulid;

const ENV_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const ENV_HEADERS: &str = "OTEL_EXPORTER_OTLP_HEADERS";
const ENV_PROTOCOL: &str = "OTEL_EXPORTER_OTLP_PROTOCOL";
const ENV_INSTANCE_ID: &str = "OTEL_SERVICE_INSTANCE_ID";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

// Noisy dependencies are capped regardless of the chosen verbosity.
const QUIET_TARGETS: [&str; 4] = [
    "hyper=error",
    "tokio=error",
    "sqlx=warn",
    "opentelemetry_sdk=warn",
];

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Exporter settings read from the standard `OTEL_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OtlpSettings {
    endpoint: String,
    headers: Vec<(String, String)>,
    instance_id: String,
}

impl OtlpSettings {
    /// `None` when no collector endpoint is configured.
    fn from_env() -> Option<Self> {
        let endpoint = var(ENV_ENDPOINT).ok().filter(|e| !e.trim().is_empty())?;

        if let Ok(protocol) = var(ENV_PROTOCOL) {
            if protocol != "grpc" {
                debug!("{ENV_PROTOCOL}='{protocol}' ignored, exporting over grpc");
            }
        }

        Some(Self {
            endpoint: with_scheme(endpoint.trim()),
            headers: var(ENV_HEADERS)
                .map(|raw| split_headers(&raw))
                .unwrap_or_default(),
            instance_id: var(ENV_INSTANCE_ID).unwrap_or_else(|_| Ulid::new().to_string()),
        })
    }

    /// Host to verify the collector certificate against, for https endpoints.
    fn tls_domain(&self) -> Option<&str> {
        let authority = self.endpoint.strip_prefix("https://")?.split('/').next()?;
        authority.split(':').next().filter(|host| !host.is_empty())
    }

    // Keys ending in "-bin" are binary metadata and carry base64 values.
    fn metadata(&self) -> Result<MetadataMap> {
        let mut meta = MetadataMap::with_capacity(self.headers.len());

        for (name, value) in &self.headers {
            let name = name.to_ascii_lowercase();

            if name.ends_with("-bin") {
                let bytes = Base64::decode_vec(value)
                    .map_err(|e| anyhow!("header {name}: value is not base64: {e}"))?;
                let key = MetadataKey::<Binary>::from_bytes(name.as_bytes())
                    .map_err(|e| anyhow!("header {name}: invalid key: {e}"))?;
                meta.insert_bin(key, MetadataValue::from_bytes(&bytes));
            } else {
                let key = MetadataKey::<Ascii>::from_bytes(name.as_bytes())
                    .map_err(|e| anyhow!("header {name}: invalid key: {e}"))?;
                let value: MetadataValue<Ascii> = value
                    .parse()
                    .map_err(|e| anyhow!("header {name}: invalid value: {e}"))?;
                meta.insert(key, value);
            }
        }

        Ok(meta)
    }

    fn resource(&self) -> Resource {
        Resource::builder_empty()
            .with_attributes([
                KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                KeyValue::new("service.instance.id", self.instance_id.clone()),
            ])
            .build()
    }

    fn install(&self) -> Result<Tracer> {
        let mut builder = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&self.endpoint)
            .with_timeout(EXPORT_TIMEOUT);

        if let Some(domain) = self.tls_domain() {
            builder = builder.with_tls_config(
                ClientTlsConfig::new()
                    .domain_name(domain.to_string())
                    .with_native_roots(),
            );
        }

        if !self.headers.is_empty() {
            builder = builder.with_metadata(self.metadata()?);
        }

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(builder.build()?)
            .with_resource(self.resource())
            .build();

        let _ = TRACER_PROVIDER.set(provider.clone());

        global::set_tracer_provider(provider.clone());
        global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]));

        Ok(provider.tracer(env!("CARGO_PKG_NAME")))
    }
}

/// Parse `key=value,key2=value2`, skipping entries without `=`.
fn split_headers(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

// gRPC assumes https when no scheme is given.
fn with_scheme(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint.trim_end_matches('/'))
    }
}

fn env_filter(level: Level) -> Result<EnvFilter> {
    QUIET_TARGETS.iter().try_fold(
        EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy(),
        |filter, directive| -> Result<EnvFilter> {
            Ok(filter.add_directive(directive.parse()?))
        },
    )
}

/// Install the global subscriber: pretty stdout logs at `verbosity_level`
/// (errors only when `None`), plus an OTLP layer when an endpoint is set.
///
/// # Errors
///
/// Returns an error if the exporter or the subscriber cannot be installed.
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty();

    let otel_layer = match OtlpSettings::from_env() {
        Some(settings) => Some(tracing_opentelemetry::layer().with_tracer(settings.install()?)),
        None => None,
    };

    let subscriber = Registry::default()
        .with(fmt_layer)
        .with(otel_layer)
        .with(env_filter(verbosity_level.unwrap_or(Level::ERROR))?);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Flush and shut down the tracer provider, if one was installed.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("shutting down tracer provider");
        let _ = provider.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(endpoint: &str, headers: &str) -> OtlpSettings {
        OtlpSettings {
            endpoint: with_scheme(endpoint),
            headers: split_headers(headers),
            instance_id: "test".to_string(),
        }
    }

    #[test]
    fn exporter_disabled_without_endpoint() {
        temp_env::with_vars([(ENV_ENDPOINT, None::<&str>)], || {
            assert!(OtlpSettings::from_env().is_none());
        });
        temp_env::with_vars([(ENV_ENDPOINT, Some("  "))], || {
            assert!(OtlpSettings::from_env().is_none());
        });
    }

    #[test]
    fn exporter_settings_from_env() {
        temp_env::with_vars(
            [
                (ENV_ENDPOINT, Some("collector.internal:4317/")),
                (ENV_HEADERS, Some("x-tenant = portal ,broken")),
                (ENV_INSTANCE_ID, Some("portal-1")),
            ],
            || {
                let settings = OtlpSettings::from_env();
                assert_eq!(
                    settings,
                    Some(OtlpSettings {
                        endpoint: "https://collector.internal:4317".to_string(),
                        headers: vec![("x-tenant".to_string(), "portal".to_string())],
                        instance_id: "portal-1".to_string(),
                    })
                );
            },
        );
    }

    #[test]
    fn instance_id_defaults_to_a_ulid() {
        temp_env::with_vars(
            [
                (ENV_ENDPOINT, Some("http://localhost:4317")),
                (ENV_INSTANCE_ID, None),
            ],
            || {
                let settings = OtlpSettings::from_env();
                let id = settings.map(|s| s.instance_id).unwrap_or_default();
                assert!(id.parse::<Ulid>().is_ok(), "{id}");
            },
        );
    }

    #[test]
    fn header_values_keep_embedded_equals() {
        assert!(split_headers("").is_empty());
        assert_eq!(
            split_headers("authorization=Basic a2V5=,=orphan"),
            vec![("authorization".to_string(), "Basic a2V5=".to_string())]
        );
    }

    #[test]
    fn tls_only_for_https_endpoints() {
        assert_eq!(
            settings("otel.example.com:4317", "").tls_domain(),
            Some("otel.example.com")
        );
        assert_eq!(settings("http://localhost:4317", "").tls_domain(), None);
    }

    #[test]
    fn binary_headers_are_base64_decoded() -> Result<()> {
        // "binary data"
        let meta = settings("localhost:4317", "Authorization=Bearer t,trace-bin=YmluYXJ5IGRhdGE=")
            .metadata()?;
        assert_eq!(meta.len(), 2);
        assert!(meta.get("authorization").is_some());
        assert_eq!(
            meta.get_bin("trace-bin").map(|v| v.to_bytes().ok()),
            Some(Some(tonic::codegen::Bytes::from_static(b"binary data")))
        );

        let err = settings("localhost:4317", "trace-bin=not base64!").metadata();
        assert!(err.is_err_and(|e| e.to_string().contains("not base64")));
        Ok(())
    }

    #[test]
    fn quiet_targets_parse() {
        assert!(env_filter(Level::TRACE).is_ok());
    }

    #[test]
    fn shutdown_without_provider_is_a_no_op() {
        shutdown_tracer();
    }
}
