use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info};

/// Liveness probe. The datastore check runs independently of the
/// prediction core: a degraded probe never fails the request envelope,
/// it is reported in the result the way the upstream monitor expects.
fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let workspace = state
        .workspace
        .as_ref()
        .map(|p| p.to_string_lossy().to_string());

    let probe = match state.db.as_ref() {
        None => Ok("not_opened"),
        Some(conn) => conn
            .query_row("SELECT 1", [], |r| r.get::<_, i64>(0))
            .map(|_| "connected"),
    };

    match probe {
        Ok(database) => {
            info!(database, "health check passed");
            ok(
                &req.id,
                json!({
                    "status": "healthy",
                    "version": env!("CARGO_PKG_VERSION"),
                    "database": database,
                    "workspacePath": workspace
                }),
            )
        }
        Err(e) => {
            error!(error = %e, "health check failed");
            ok(
                &req.id,
                json!({
                    "status": "unhealthy",
                    "version": env!("CARGO_PKG_VERSION"),
                    "database": "error",
                    "error": e.to_string(),
                    "workspacePath": workspace
                }),
            )
        }
    }
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = path else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            info!(workspace = %path.display(), "workspace opened");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
