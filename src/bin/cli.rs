//! meshkv CLI Client
//!
//! Command-line interface for interacting with a meshkv provider.

use clap::{Parser, Subcommand};
use meshkv::{BulkPoolConfig, Client, Config, MeshError, ProviderHandle};
use tracing_subscriber::{fmt, EnvFilter};

/// meshkv CLI
#[derive(Parser, Debug)]
#[command(name = "meshkv-cli")]
#[command(about = "CLI for the meshkv key-value service")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    server: String,

    /// Multiplex id of the target provider
    #[arg(short, long, default_value = "0")]
    provider: u8,

    /// Database name
    #[arg(short, long, default_value = "default")]
    db: String,

    /// Per-call timeout (ms, 0 = none)
    #[arg(long, default_value = "0")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        key: String,

        /// Largest value accepted, in bytes
        #[arg(long, default_value = "1048576")]
        max_size: usize,
    },

    /// Store a key-value pair
    Put { key: String, value: String },

    /// Erase a key
    Erase { key: String },

    /// Print the size of a value
    Length { key: String },

    /// List keys (and optionally values) in order
    List {
        /// Only keys starting with this prefix
        #[arg(long, default_value = "")]
        prefix: String,

        /// Start strictly after this key
        #[arg(long, default_value = "")]
        start: String,

        /// Page size
        #[arg(long, default_value = "100")]
        max: usize,

        /// Largest key accepted, in bytes
        #[arg(long, default_value = "256")]
        key_capacity: usize,

        /// Also print values up to this many bytes
        #[arg(long)]
        values: Option<usize>,
    },

    /// Ask the server to stop
    Shutdown,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> meshkv::Result<()> {
    let mut builder = Config::builder().rpc_timeout_ms(args.timeout_ms);
    if let Some(pool) = BulkPoolConfig::from_env()? {
        builder = builder.bulk_pool(pool);
    }
    let client = Client::new(builder.build())?;
    let address = client.lookup(&args.server).await?;

    if let Commands::Shutdown = args.command {
        client.shutdown_service(&address).await?;
        println!("shutdown sent");
        return Ok(());
    }

    let handle = client.provider_handle(&address, args.provider);
    let result = execute(&handle, &args.db, args.command).await;
    handle.release();
    client.finalize();
    result
}

async fn execute(handle: &ProviderHandle, db: &str, command: Commands) -> meshkv::Result<()> {
    let db_id = handle.open(db).await?;

    match command {
        Commands::Get { key, max_size } => match handle.get(db_id, key.as_bytes(), max_size).await {
            Ok(Some(value)) => println!("{}", String::from_utf8_lossy(&value)),
            Ok(None) => println!("(not found)"),
            Err(MeshError::Truncated { size }) => {
                println!("(value is {} bytes, retry with --max-size {})", size, size)
            }
            Err(e) => return Err(e),
        },
        Commands::Put { key, value } => {
            if handle.put(db_id, key.as_bytes(), value.as_bytes()).await? {
                println!("OK");
            } else {
                println!("(rejected: key exists)");
            }
        }
        Commands::Erase { key } => {
            if handle.erase(db_id, key.as_bytes()).await? {
                println!("OK");
            } else {
                println!("(not found)");
            }
        }
        Commands::Length { key } => match handle.length(db_id, key.as_bytes()).await? {
            Some(size) => println!("{}", size),
            None => println!("(not found)"),
        },
        Commands::List {
            prefix,
            start,
            max,
            key_capacity,
            values,
        } => match values {
            Some(value_capacity) => {
                let pairs = handle
                    .list_keyvals(
                        db_id,
                        start.as_bytes(),
                        prefix.as_bytes(),
                        max,
                        key_capacity,
                        value_capacity,
                    )
                    .await?;
                for (key, value) in pairs {
                    println!(
                        "{} = {}",
                        String::from_utf8_lossy(&key),
                        String::from_utf8_lossy(&value)
                    );
                }
            }
            None => {
                let keys = handle
                    .list_keys(db_id, start.as_bytes(), prefix.as_bytes(), max, key_capacity)
                    .await?;
                for key in keys {
                    println!("{}", String::from_utf8_lossy(&key));
                }
            }
        },
        Commands::Shutdown => {}
    }
    Ok(())
}
