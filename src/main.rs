#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::Result;
use clap::Parser;
use marquee_api::config::Overrides;
use marquee_api::server;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "marquee-api", about = "JSON API for a movie catalog")]
struct Cli {
    /// Path to the config file (.toml or .json); missing means defaults
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// API server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Environment (development|staging|production)
    #[arg(long)]
    env: Option<String>,

    /// Rate limiter maximum requests per second
    #[arg(long)]
    limiter_rps: Option<f64>,

    /// Rate limiter maximum burst
    #[arg(long)]
    limiter_burst: Option<u32>,

    /// Enable rate limiter
    #[arg(long)]
    limiter_enabled: Option<bool>,

    /// Trusted CORS origins (space separated)
    #[arg(long, value_delimiter = ' ', num_args = 1..)]
    trusted_origins: Option<Vec<String>>,

    /// Admin listen address for health/metrics; empty disables it
    #[arg(long)]
    admin_listen: Option<String>,

    /// Tokio worker threads (default: available parallelism)
    #[arg(long)]
    worker_threads: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let worker_threads = cli.worker_threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1)
    });

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .enable_all()
        .build()?;

    rt.block_on(server::bootstrap::run(server::bootstrap::BootstrapArgs {
        config_path: cli.config,
        overrides: Overrides {
            port: cli.port,
            env: cli.env,
            limiter_rps: cli.limiter_rps,
            limiter_burst: cli.limiter_burst,
            limiter_enabled: cli.limiter_enabled,
            trusted_origins: cli.trusted_origins,
            admin_listen: cli.admin_listen,
        },
    }))
}
