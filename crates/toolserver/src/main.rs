use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use toolserver::Database;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dbchat-tools")]
#[command(about = "Database tool service for dbchat", long_about = None)]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "MCP_SERVER_PORT", default_value_t = 3001)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// SQLite database file
    #[arg(short, long, env = "DBCHAT_DATABASE", default_value = "dbchat.db")]
    database: PathBuf,

    /// Shut down when stdin reaches EOF (set when launched by dbchat)
    #[arg(long)]
    watch_stdin: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match run(Args::parse()).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "tool service failed");
            1
        }
    };
    // A pending stdin read would otherwise keep the runtime alive.
    std::process::exit(code);
}

async fn run(args: Args) -> toolserver::Result<()> {
    let db = Arc::new(Database::open(&args.database)?);
    let listener = TcpListener::bind((args.host.as_str(), args.port)).await?;
    info!(
        addr = %listener.local_addr()?,
        database = %args.database.display(),
        "tool service listening"
    );

    toolserver::serve(listener, db.clone(), shutdown_signal(args.watch_stdin)).await?;

    info!("closing database");
    db.close()?;
    info!("tool service stopped");
    Ok(())
}

async fn shutdown_signal(watch_stdin: bool) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for interrupt");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let stdin_closed = async {
        if watch_stdin {
            let _ = tokio::io::copy(&mut tokio::io::stdin(), &mut tokio::io::sink()).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = interrupt => info!("received interrupt, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
        () = stdin_closed => info!("stdin closed, shutting down"),
    }
}
