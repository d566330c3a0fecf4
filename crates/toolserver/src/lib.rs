//! Tool execution service for dbchat.
//!
//! Exposes the database tools over HTTP against an SQLite database. Each tool
//! is a `POST /tools/{name}` route taking the tool's JSON arguments; `GET
//! /health` reports readiness to the bridge that launched the service.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use toolserver::Database;
//!
//! # async fn example() -> toolserver::Result<()> {
//! let db = Arc::new(Database::open("dbchat.db")?);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3001").await?;
//!
//! toolserver::serve(listener, db.clone(), async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await?;
//!
//! db.close()?;
//! # Ok(())
//! # }
//! ```

mod database;
mod error;
mod routes;

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

pub use database::{Column, Database, QueryOutput};
pub use error::{Error, Result};
pub use routes::router;

/// Serve the tool routes until `shutdown` resolves.
///
/// In-flight requests are drained before this returns; the caller still owns
/// the database and closes it afterwards.
pub async fn serve(
    listener: TcpListener,
    db: Arc<Database>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    axum::serve(listener, router(db))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
