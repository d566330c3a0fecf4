//! HTTP routes of the tool service.
//!
//! Every tool answers `200 OK` with `{"success": true, ...}` or
//! `{"success": false, "error": ...}` so callers can hand the body straight
//! back to the model.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{Database, Error, Result};

type Db = Arc<Database>;

#[derive(Debug, Deserialize)]
struct QueryArgs {
    sql: String,
}

#[derive(Debug, Deserialize)]
struct DescribeArgs {
    table_name: String,
}

/// Build the router for the three database tools plus `/health`.
pub fn router(db: Db) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tools/query_database", post(query_database))
        .route("/tools/get_tables", post(get_tables))
        .route("/tools/describe_table", post(describe_table))
        .with_state(db)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn query_database(State(db): State<Db>, body: Bytes) -> Json<Value> {
    respond("query_database", run_query(db, body).await)
}

async fn get_tables(State(db): State<Db>) -> Json<Value> {
    let result = blocking(db, |db| db.tables())
        .await
        .map(|tables| json!({ "success": true, "tables": tables }));
    respond("get_tables", result)
}

async fn describe_table(State(db): State<Db>, body: Bytes) -> Json<Value> {
    respond("describe_table", run_describe(db, body).await)
}

async fn run_query(db: Db, body: Bytes) -> Result<Value> {
    let QueryArgs { sql } = parse_args(&body)?;
    debug!(%sql, "running query");
    let data = blocking(db, move |db| db.query(&sql)).await?;
    Ok(json!({ "success": true, "data": data }))
}

async fn run_describe(db: Db, body: Bytes) -> Result<Value> {
    let DescribeArgs { table_name } = parse_args(&body)?;
    let structure = blocking(db, move |db| db.describe(&table_name)).await?;
    Ok(json!({ "success": true, "structure": structure }))
}

fn parse_args<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| Error::InvalidArguments(e.to_string()))
}

/// Run a database call off the async workers.
async fn blocking<T, F>(db: Db, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(db.as_ref()))
        .await
        .map_err(|e| Error::Task(e.to_string()))?
}

fn respond(tool: &str, result: Result<Value>) -> Json<Value> {
    match result {
        Ok(body) => Json(body),
        Err(e) => {
            warn!(tool, error = %e, "tool failed");
            Json(e.to_payload())
        }
    }
}
