//! CLI command handlers.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use app_core::{Kind, Object, Scheme};
use app_events::{InMemoryObjectStore, ObjectApi, TracingObjectApi, TracingRecorder};
use app_reconciler::{Controller, ControllerConfig, desired_dependents};
use itertools::Itertools;
use tokio::signal;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::cli::{Commands, OutputFormat};

/// Execute a CLI command.
pub async fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            manifests,
            config,
            workers,
            max_retries,
        } => cmd_run(&manifests, config.as_deref(), workers, max_retries).await,

        Commands::Render { manifest, output } => cmd_render(&manifest, output),
    }
}

async fn cmd_run(
    manifests: &Path,
    config_path: Option<&Path>,
    workers: Option<usize>,
    max_retries: Option<u32>,
) -> Result<()> {
    let config = resolve_config(config_path, workers, max_retries)?;
    let scheme = Scheme::with_defaults();
    let objects = load_manifest(manifests, &scheme)?;

    let store = Arc::new(TracingObjectApi::new(InMemoryObjectStore::new()));
    for object in objects {
        let kind = object.kind();
        let key = object.key();
        store
            .create(object)
            .await
            .with_context(|| format!("Failed to seed {kind} {key}"))?;
    }
    info!(
        apps = store.inner().len(Kind::App).await,
        path = %manifests.display(),
        "Seeded store from manifest"
    );

    let controller = Controller::new(
        store.clone(),
        Arc::new(TracingRecorder::new()),
        scheme,
        config,
    )
    .context("Invalid controller configuration")?;

    let stopper = controller.stopper();
    let signal_task = tokio::spawn(async move {
        wait_for_shutdown().await;
        stopper.stop();
    });

    let result = controller.run().await;
    signal_task.abort();

    log_summary(store.inner()).await;
    result.context("Controller failed")
}

fn cmd_render(manifest: &Path, output: OutputFormat) -> Result<()> {
    let scheme = Scheme::with_defaults();
    let input = std::fs::read_to_string(manifest)
        .with_context(|| format!("Failed to read manifest {}", manifest.display()))?;
    let rendered = render(&input, &scheme, output)?;
    println!("{rendered}");
    Ok(())
}

/// Load the config file (or defaults) and apply CLI overrides.
fn resolve_config(
    path: Option<&Path>,
    workers: Option<usize>,
    max_retries: Option<u32>,
) -> Result<ControllerConfig> {
    let mut config = match path {
        Some(path) => ControllerConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ControllerConfig::default(),
    };
    if let Some(workers) = workers {
        config.workers = workers;
    }
    if let Some(max_retries) = max_retries {
        config.max_retries = max_retries;
    }
    config.validate().context("Invalid controller configuration")?;
    Ok(config)
}

fn load_manifest(path: &Path, scheme: &Scheme) -> Result<Vec<Object>> {
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    scheme
        .decode_yaml(&input)
        .with_context(|| format!("Failed to decode manifest {}", path.display()))
}

/// Render the desired dependents of every App in `input`.
///
/// Only dependents the App requires are printed; disabled ones are left out.
/// Apps without a uid get a fresh one so owner references can be built.
/// Other kinds in the manifest are skipped.
fn render(input: &str, scheme: &Scheme, output: OutputFormat) -> Result<String> {
    let mut manifests = Vec::new();
    for object in scheme.decode_yaml(input)? {
        let mut app = match object {
            Object::App(app) => app,
            other => {
                debug!(kind = %other.kind(), key = %other.key(), "Skipping non-App object");
                continue;
            }
        };
        if app.metadata.uid.is_none() {
            app.metadata.uid = Some(Uuid::new_v4());
        }
        for dependent in desired_dependents(&app, scheme)?
            .into_iter()
            .filter(|d| d.required)
        {
            manifests.push(scheme.encode(&dependent.object)?);
        }
    }

    match output {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&manifests)?),
        OutputFormat::Yaml => {
            let documents = manifests
                .iter()
                .map(serde_yaml::to_string)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(documents.iter().map(|d| d.trim_end()).join("\n---\n"))
        }
    }
}

async fn log_summary(store: &InMemoryObjectStore) {
    for kind in Kind::ALL {
        info!(kind = %kind, count = store.len(kind).await, "Objects at exit");
    }
    match store.list(Kind::App, None).await {
        Ok(apps) => {
            for app in apps.iter().filter_map(Object::as_app) {
                info!(
                    app = %app.metadata.key(),
                    deployment = ?app.status.deployment_name,
                    service = ?app.status.service_name,
                    ingress = ?app.status.ingress_name,
                    "App status"
                );
            }
        }
        Err(e) => error!(error = %e, "Failed to list Apps for summary"),
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
