//! meshkv Server Binary
//!
//! Declares databases on one provider and serves them over TCP.

use clap::Parser;
use meshkv::network::{Provider, Server};
use meshkv::{Backend, Config, DatabaseConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// meshkv Server
#[derive(Parser, Debug)]
#[command(name = "meshkv-server")]
#[command(about = "Multiplexed key-value service")]
#[command(version)]
struct Args {
    /// Data directory (parent of persistent databases)
    #[arg(short, long, default_value = "./meshkv_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Close connections idle for this long (ms, 0 = never)
    #[arg(long, default_value = "0")]
    read_timeout_ms: u64,

    /// Multiplex id of the provider
    #[arg(short, long, default_value = "0")]
    provider_id: u8,

    /// Database to serve, as name[:backend] (map, null, sled); repeatable
    #[arg(long = "database", value_name = "NAME[:BACKEND]")]
    databases: Vec<String>,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,meshkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("meshkv Server v{}", meshkv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .read_timeout_ms(args.read_timeout_ms)
        .build();

    let provider = Provider::new(args.provider_id);
    for declaration in &args.databases {
        let database = match parse_database(declaration, &config) {
            Ok(database) => database,
            Err(e) => {
                tracing::error!("Bad --database {:?}: {}", declaration, e);
                std::process::exit(2);
            }
        };
        let name = database.name.clone();
        match provider.add_database(database) {
            Ok(id) => tracing::info!("Serving database {} as {}", name, id),
            Err(e) => {
                tracing::error!("Failed to open database {}: {}", name, e);
                std::process::exit(1);
            }
        }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let server = Server::new(config);
    if let Err(e) = server.register_provider(provider) {
        tracing::error!("Failed to register provider: {}", e);
        std::process::exit(1);
    }

    let result = runtime.block_on(async {
        let stopper = server.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
                stopper.shutdown();
            }
        });
        server.run().await
    });

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

/// Parse `name[:backend]` into a database declaration under the data dir
fn parse_database(declaration: &str, config: &Config) -> meshkv::Result<DatabaseConfig> {
    let (name, backend) = match declaration.split_once(':') {
        Some((name, backend)) => (name, backend.parse::<Backend>()?),
        None => (declaration, Backend::default()),
    };
    if name.is_empty() {
        return Err(meshkv::MeshError::Config("database name is empty".to_string()));
    }
    Ok(DatabaseConfig::builder(name)
        .backend(backend)
        .path(&config.data_dir)
        .build())
}
