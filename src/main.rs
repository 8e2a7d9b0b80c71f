//! sockloop - Echo Server
//!
//! Runs a `ServerConnector` with the built-in echo handler. Useful for
//! smoke-testing the transport with `nc` or any TCP client.

use sockloop::{BufferCache, ServerConnector, TransportConfig, ECHO_HANDLER};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Read buffer size per connection
    read_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: sockloop::DEFAULT_HOST.to_string(),
            port: sockloop::DEFAULT_PORT,
            read_buffer_size: TransportConfig::default().read_buffer_size,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = value_for(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = value_for(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--read-buffer" => {
                    config.read_buffer_size = value_for(&args, i, "--read-buffer")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Error: invalid buffer size");
                            std::process::exit(1);
                        });
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("sockloop version {}", sockloop::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the address to bind
    fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid host address: {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Returns the argument after `args[i]`, or exits if there is none.
fn value_for<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
sockloop - A Non-Blocking TCP Echo Server

USAGE:
    sockloop [OPTIONS]

OPTIONS:
    -h, --host <HOST>          Address to bind to (default: 0.0.0.0)
    -p, --port <PORT>          Port to listen on (default: 7007)
        --read-buffer <BYTES>  Read buffer size per connection (default: 8192)
    -v, --version              Print version information
        --help                 Print this help message

EXAMPLES:
    sockloop                        # Echo on 0.0.0.0:7007
    sockloop --port 9000            # Echo on port 9000
    sockloop --host 127.0.0.1       # Local connections only

CONNECTING:
    $ nc 127.0.0.1 7007
    hello
    hello

LOGGING:
    Set RUST_LOG to adjust verbosity, e.g. RUST_LOG=sockloop=trace
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let addr = config.bind_address()?;

    // One cache shared by every connection
    let cache = Arc::new(BufferCache::new());

    let transport = TransportConfig {
        read_buffer_size: config.read_buffer_size,
        ..TransportConfig::default()
    };
    let server = ServerConnector::with_config(Arc::clone(&cache), transport);
    server.set_message_handler(Arc::new(ECHO_HANDLER));

    let bound = server.start_listening_on(addr).await?;
    info!(
        "sockloop v{} echoing on {} (read buffer {} bytes)",
        sockloop::VERSION,
        bound,
        config.read_buffer_size
    );
    println!("Use Ctrl+C to shutdown gracefully.");

    signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping server...");

    let stats = server.stats();
    info!(
        connections = stats.connections_opened.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        "Final statistics"
    );
    server.close();

    let cache_stats = cache.stats();
    info!(
        hits = cache_stats.hits,
        misses = cache_stats.misses,
        "Buffer cache statistics"
    );

    info!("Server shutdown complete");
    Ok(())
}
