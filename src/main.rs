//! linematch binary — thin CLI shell over the [`linematch_server`] library.

use clap::{CommandFactory, Parser, Subcommand};
use linematch_server::config;
use linematch_server::metrics::MetricsSink;
use linematch_server::search::Catalogue;
use linematch_server::server::{run_acceptor, ServerContext};
use linematch_server::snapshot::Snapshot;
use linematch_server::store::FileStore;
use linematch_server::{tls, watch};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

// ---------------------------------------------------------------------------
// CLI definition (clap derive)
// ---------------------------------------------------------------------------

/// Concurrent TCP server answering exact whole-line membership queries over
/// a watched text file.
#[derive(Parser)]
#[command(name = "linematch", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the server settings file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 44445)]
    port: u16,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ---------------------------------------------------------------------------
// Graceful shutdown signal
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down..."),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C, shutting down...");
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("linematch_server=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "linematch", &mut std::io::stdout());
        return;
    }

    let settings = config::read_config(&cli.config).unwrap_or_else(|e| {
        error!(config = %cli.config.display(), error = %e, "could not load settings");
        std::process::exit(1);
    });

    let names = config::load_algorithm_names(&settings.algorithms_list).unwrap_or_else(|e| {
        error!(path = %settings.algorithms_list.display(), error = %e, "could not load catalogue descriptor");
        std::process::exit(1);
    });
    let catalogue = Catalogue::new(names).unwrap_or_else(|e| {
        error!(error = %e, "invalid catalogue descriptor");
        std::process::exit(1);
    });

    let reread_on_query =
        config::load_reread_on_query(&settings.reread_on_query_config, &settings.file_path)
            .unwrap_or_else(|e| {
                error!(error = %e, "could not load reread registry");
                std::process::exit(1);
            });

    let tls_acceptor = if settings.use_ssl {
        match (&settings.ssl_certfile, &settings.ssl_keyfile) {
            (Some(cert), Some(key)) => {
                Some(tls::load_tls_acceptor(cert, key).unwrap_or_else(|e| {
                    error!(error = %e, "could not load TLS material");
                    std::process::exit(1);
                }))
            }
            _ => {
                error!("SSL configuration is incomplete");
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    // Preload one snapshot before any traffic is accepted.
    let initial = Snapshot::load(&settings.file_path).unwrap_or_else(|e| {
        error!(path = %settings.file_path.display(), error = %e, "could not preload watched file");
        std::process::exit(1);
    });
    info!(path = %settings.file_path.display(), lines = initial.lines.len(), "preloaded initial snapshot");
    let store = Arc::new(FileStore::new(initial));

    // Keep the handle alive — dropping it stops the watcher.
    let _watcher = watch::start_watcher(settings.file_path.clone(), Arc::clone(&store));

    let metrics = MetricsSink::spawn(settings.metrics_json_path.clone(), catalogue.names().to_vec());

    let listener = TcpListener::bind((cli.host.as_str(), cli.port)).await.unwrap_or_else(|e| {
        error!(host = cli.host.as_str(), port = cli.port, error = %e, "could not bind");
        std::process::exit(1);
    });
    info!(
        host = cli.host.as_str(),
        port = cli.port,
        tls = settings.use_ssl,
        reread_on_query,
        "server listening"
    );

    let ctx = Arc::new(ServerContext {
        store,
        catalogue,
        file_path: settings.file_path.clone(),
        reread_on_query,
        metrics,
    });

    tokio::select! {
        _ = run_acceptor(listener, tls_acceptor, ctx) => {
            error!("listener failed");
            std::process::exit(1);
        }
        _ = shutdown_signal() => {}
    }
}
