//! # Trigger-Gate Service
//!
//! Binary entry point for the Trigger-Gate interceptor service.
//!
//! This executable:
//! - Loads configuration from files and the environment
//! - Initializes logging
//! - Builds the secret store, secret cache and interceptor registry
//! - Starts the HTTP server from trigger-gate-api

use anyhow::Context;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trigger_gate_api::{
    start_server, InterceptorRegistry, LoggingConfig, SecretStoreConfig, ServiceConfig,
    ServiceError,
};
use trigger_gate_core::{
    secrets::{cache::SecretCache, SecretResolver},
    FilesystemSecretStore, InMemorySecretStore, SecretStore, SystemClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let service_config = load_config()?;
    init_logging(&service_config.logging);

    info!("Starting Trigger-Gate Service");

    service_config
        .validate()
        .context("service configuration is invalid")?;

    // -------------------------------------------------------------------------
    // Secret resolution
    //
    // One cache is shared by every interceptor. Entries expire on their own;
    // nothing needs to be torn down at shutdown.
    // -------------------------------------------------------------------------
    let store = build_secret_store(&service_config.secrets.store);
    let cache = Arc::new(SecretCache::new(
        store,
        Arc::new(SystemClock),
        service_config.cache_config(),
    ));
    let resolver = SecretResolver::new(cache, service_config.secrets.default_namespace.clone());

    let registry = InterceptorRegistry::with_builtins(&service_config.interceptors, &resolver)
        .context("failed to build the interceptor registry")?;
    info!(interceptors = ?registry.names(), "Registered interceptors");

    if let Err(e) = start_server(service_config, registry).await {
        error!(error = %e, "Server terminated with an error");

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }

    Ok(())
}

// ============================================================================
// Private helpers
// ============================================================================

/// Load the service configuration.
///
/// Sources (applied in order, later sources override earlier ones):
///  1. `/etc/trigger-gate/service.yaml`: system-wide defaults
///  2. `./config/service.yaml`: deployment-local override
///  3. Path given by the `TG_CONFIG_FILE` env var: operator-specified file
///  4. Environment variables prefixed `TG__` (double-underscore separator),
///     e.g. `TG__SERVER__PORT=9090` sets `server.port = 9090`
///
/// Absent files are fine since every field has a default. A malformed file
/// or a value of the wrong type is a hard error.
fn load_config() -> anyhow::Result<ServiceConfig> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/trigger-gate/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Ok(explicit_path) = std::env::var("TG_CONFIG_FILE") {
        if !explicit_path.is_empty() {
            builder = builder.add_source(
                config::File::with_name(&explicit_path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
        }
    }

    builder
        .add_source(
            config::Environment::with_prefix("TG")
                .try_parsing(true)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
        .context("failed to build configuration")?
        .try_deserialize()
        .context("could not deserialize service configuration")
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when it is set.
fn init_logging(logging: &LoggingConfig) {
    let level = &logging.level;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "trigger_gate_service={level},trigger_gate_api={level},\
             trigger_gate_core={level},tower_http=debug"
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_secret_store(config: &SecretStoreConfig) -> Arc<dyn SecretStore> {
    match config {
        SecretStoreConfig::Filesystem { root } => {
            info!(root = %root.display(), "Using filesystem secret store");
            Arc::new(FilesystemSecretStore::new(root.clone()))
        }
        SecretStoreConfig::Memory => {
            info!("Using in-memory secret store; no secrets are loaded");
            Arc::new(InMemorySecretStore::new())
        }
    }
}
