//! Serve command implementation.

use livedata_codec::{Document, Value};
use livedata_core::{MemoryDataSource, Methods, PublicationOptions, Registry, RegistryBuilder};
use livedata_server::{tcp, LiveDataServer, ServerConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Options of the serve command.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Address to listen on.
    pub bind: SocketAddr,
    /// Seed file, if any.
    pub seed: Option<PathBuf>,
    /// Periodic re-poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Throttle window in milliseconds.
    pub throttle_ms: u64,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl ServeOptions {
    fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.bind)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_throttle_window(Duration::from_millis(self.throttle_ms))
            .with_max_connections(self.max_connections)
    }
}

/// Contents of a seed file.
#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
    /// Documents per collection.
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<Document>>,
    /// Publication options per publication name.
    #[serde(default)]
    pub publications: BTreeMap<String, Value>,
}

/// Reads a seed file.
pub fn load_seed(path: &Path) -> Result<SeedFile, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read seed file {:?}: {}", path, e))?;
    let seed = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid seed file {:?}: {}", path, e))?;
    Ok(seed)
}

/// Loads the seed into a store and builds the registry.
///
/// Without explicit publications every collection is published under its
/// own name.
pub fn build(seed: SeedFile) -> Result<(Registry, Arc<MemoryDataSource>), Box<dyn std::error::Error>> {
    let store = MemoryDataSource::new();
    let mut builder = RegistryBuilder::new();

    for (name, documents) in seed.collections {
        let count = store.seed(&name, documents)?;
        builder.register_collection(name.as_str(), Methods::new())?;
        info!(collection = %name, documents = count, "collection loaded");
    }

    if seed.publications.is_empty() {
        let names: Vec<String> = store.collection_names();
        for name in names {
            builder.publish(name.as_str(), PublicationOptions::new())?;
        }
    } else {
        for (name, options) in &seed.publications {
            let options = PublicationOptions::from_value(options)
                .map_err(|e| format!("Publication {}: {}", name, e))?;
            builder.publish(name.as_str(), options)?;
        }
    }

    Ok((builder.build(), Arc::new(store)))
}

/// Runs the serve command until Ctrl-C.
pub fn run(options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let seed = match &options.seed {
        Some(path) => load_seed(path)?,
        None => {
            warn!("no seed file given, serving an empty data source");
            SeedFile::default()
        }
    };
    let (registry, store) = build(seed)?;
    let publications: Vec<String> = registry.publication_names().map(str::to_owned).collect();
    let config = options.server_config();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let listener = TcpListener::bind(config.bind_addr).await?;
        info!(addr = %listener.local_addr()?, publications = ?publications, "LiveData server ready");
        let server = Arc::new(LiveDataServer::new(config, Arc::new(registry), store));
        tcp::serve_with_shutdown(listener, server, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;
        Ok::<_, Box<dyn std::error::Error>>(())
    })?;

    info!("server stopped");
    Ok(())
}
