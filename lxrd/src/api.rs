// Copyright (c) 2023 Yan Ka, Chiu.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions
// are met:
// 1. Redistributions of source code must retain the above copyright
//    notice, this list of conditions, and the following disclaimer,
//    without modification, immediately at the beginning of the file.
// 2. The name of the author may not be used to endorse or promote products
//    derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE AUTHOR AND CONTRIBUTORS ``AS IS'' AND
// ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
// IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE
// ARE DISCLAIMED. IN NO EVENT SHALL THE AUTHOR OR CONTRIBUTORS BE LIABLE FOR
// ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
// DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS
// OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION)
// HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT
// LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY
// OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF
// SUCH DAMAGE.
use crate::context::ServerContext;
use crate::create::CreateRequest;
use crate::errors::Error;
use crate::exec::ExecRequest;
use crate::files::{self, FileMeta};
use crate::lifecycle::{ContainerPostRequest, ContainerPutRequest, StateRequest};
use crate::operation::{run_sync, Response};
use crate::snapshot::{SnapshotRenameRequest, SnapshotRequest};
use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        match self {
            Response::Sync(metadata) => (
                StatusCode::OK,
                Json(json!({
                    "type": "sync",
                    "status": "Success",
                    "status_code": 200,
                    "metadata": metadata,
                })),
            )
                .into_response(),
            Response::Async {
                operation,
                metadata,
            } => (
                StatusCode::ACCEPTED,
                Json(json!({
                    "type": "async",
                    "status": "Operation created",
                    "status_code": 100,
                    "operation": format!("/1.0/operations/{operation}"),
                    "metadata": metadata,
                })),
            )
                .into_response(),
        }
    }
}

pub fn router(ctx: Arc<ServerContext>) -> Router {
    Router::new()
        .route("/1.0/containers", get(list_containers).post(create_container))
        .route(
            "/1.0/containers/:name",
            get(get_container)
                .put(put_container)
                .post(post_container)
                .delete(delete_container),
        )
        .route(
            "/1.0/containers/:name/state",
            get(get_state).put(put_state),
        )
        .route(
            "/1.0/containers/:name/files",
            get(get_file).post(post_file),
        )
        .route(
            "/1.0/containers/:name/snapshots",
            get(list_snapshots).post(create_snapshot),
        )
        .route(
            "/1.0/containers/:name/snapshots/:leaf",
            get(get_snapshot).post(rename_snapshot).delete(delete_snapshot),
        )
        .route("/1.0/containers/:name/exec", post(exec_container))
        .route("/1.0/operations/:id", get(get_operation))
        .route("/1.0/operations/:id/wait", get(wait_operation))
        .route("/1.0/operations/:id/websocket", get(operation_websocket))
        .with_state(ctx)
}

pub async fn serve(ctx: Arc<ServerContext>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&ctx.config.listen).await?;
    info!("API listening on {}", ctx.config.listen);
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

async fn list_containers(
    State(ctx): State<Arc<ServerContext>>,
) -> Result<Response, Error> {
    let names = ctx.db.list_container_names()?;
    run_sync(|| {
        let urls: Vec<String> = names
            .iter()
            .map(|name| format!("/1.0/containers/{name}"))
            .collect();
        Ok(json!(urls))
    })
}

async fn create_container(
    State(ctx): State<Arc<ServerContext>>,
    Json(request): Json<CreateRequest>,
) -> Result<Response, Error> {
    crate::create::create_container(ctx, request).await
}

async fn get_container(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
) -> Result<Response, Error> {
    let (id, architecture) = ctx.db.container_meta(&name)?;
    let config = ctx.db.load_config(id)?;
    let profiles = ctx.db.load_profiles(id)?;
    let devices = ctx.db.load_devices(&name, false)?;
    let status = container_status(&ctx, &name);
    run_sync(|| {
        Ok(json!({
            "name": name,
            "architecture": architecture,
            "profiles": profiles,
            "config": config,
            "devices": devices,
            "status": status,
        }))
    })
}

fn container_status(ctx: &ServerContext, name: &str) -> Value {
    let handle = ctx.bare_handle(name);
    if handle.running() {
        json!({"status": "Running", "init": handle.init_pid()})
    } else {
        json!({"status": "Stopped", "init": Value::Null})
    }
}

async fn put_container(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Json(request): Json<ContainerPutRequest>,
) -> Result<Response, Error> {
    crate::lifecycle::update_container(ctx, name, request).await
}

async fn post_container(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Json(request): Json<ContainerPostRequest>,
) -> Result<Response, Error> {
    crate::lifecycle::post_container(ctx, name, request).await
}

async fn delete_container(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
) -> Result<Response, Error> {
    crate::lifecycle::delete_container(ctx, name).await
}

async fn get_state(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
) -> Result<Response, Error> {
    ctx.db.container_id_by_name(&name)?;
    let status = container_status(&ctx, &name);
    run_sync(|| Ok(status))
}

async fn put_state(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Json(request): Json<StateRequest>,
) -> Result<Response, Error> {
    crate::lifecycle::change_state(ctx, name, request).await
}

fn required_path(params: &HashMap<String, String>) -> Result<&str, Error> {
    params
        .get("path")
        .map(|s| s.as_str())
        .ok_or_else(|| Error::bad_request("missing path query parameter"))
}

async fn get_file(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<axum::response::Response, Error> {
    let path = required_path(&params)?;
    let content = files::fetch(ctx, &name, path).await?;
    axum::response::Response::builder()
        .header(files::UID_HEADER, content.uid.to_string())
        .header(files::GID_HEADER, content.gid.to_string())
        .header(files::MODE_HEADER, content.mode)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(axum::body::Body::from(content.body))
        .map_err(|error| Error::Internal(anyhow::anyhow!("cannot build response: {error}")))
}

fn file_meta(headers: &HeaderMap) -> Result<FileMeta, Error> {
    let mut meta = FileMeta::default();
    let field = |name: &str| -> Result<Option<&str>, Error> {
        match headers.get(name) {
            None => Ok(None),
            Some(value) => value
                .to_str()
                .map(Some)
                .map_err(|_| Error::bad_request(format!("unreadable {name} header"))),
        }
    };
    if let Some(uid) = field(files::UID_HEADER)? {
        meta.uid = uid
            .parse()
            .map_err(|_| Error::bad_request(format!("bad uid {uid:?}")))?;
    }
    if let Some(gid) = field(files::GID_HEADER)? {
        meta.gid = gid
            .parse()
            .map_err(|_| Error::bad_request(format!("bad gid {gid:?}")))?;
    }
    if let Some(mode) = field(files::MODE_HEADER)? {
        meta.mode = files::parse_mode(mode)?;
    }
    Ok(meta)
}

async fn post_file(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Error> {
    let path = required_path(&params)?;
    let meta = file_meta(&headers)?;
    files::store(ctx, &name, path, meta, &body).await?;
    Ok(Response::Sync(Value::Null))
}

async fn list_snapshots(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
) -> Result<Response, Error> {
    crate::snapshot::list_snapshots(ctx, name).await
}

async fn create_snapshot(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Json(request): Json<SnapshotRequest>,
) -> Result<Response, Error> {
    crate::snapshot::create_snapshot(ctx, name, request).await
}

async fn get_snapshot(
    State(ctx): State<Arc<ServerContext>>,
    Path((name, leaf)): Path<(String, String)>,
) -> Result<Response, Error> {
    crate::snapshot::describe_snapshot(ctx, name, leaf).await
}

async fn rename_snapshot(
    State(ctx): State<Arc<ServerContext>>,
    Path((name, leaf)): Path<(String, String)>,
    Json(request): Json<SnapshotRenameRequest>,
) -> Result<Response, Error> {
    crate::snapshot::rename_snapshot(ctx, name, leaf, request).await
}

async fn delete_snapshot(
    State(ctx): State<Arc<ServerContext>>,
    Path((name, leaf)): Path<(String, String)>,
) -> Result<Response, Error> {
    crate::snapshot::delete_snapshot(ctx, name, leaf).await
}

async fn exec_container(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Json(request): Json<ExecRequest>,
) -> Result<Response, Error> {
    crate::exec::exec_container(ctx, name, request).await
}

async fn get_operation(
    State(ctx): State<Arc<ServerContext>>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    let operation = ctx
        .operations
        .get(&id)
        .ok_or_else(|| Error::not_found(format!("no operation {id}")))?;
    run_sync(|| Ok(operation.render()))
}

async fn wait_operation(
    State(ctx): State<Arc<ServerContext>>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    let operation = ctx
        .operations
        .wait(&id)
        .await
        .ok_or_else(|| Error::not_found(format!("no operation {id}")))?;
    run_sync(|| Ok(operation.render()))
}

/// Bind one websocket slot of an operation. The operation existing but the
/// secret being wrong is an authentication failure, not a missing resource.
async fn operation_websocket(
    State(ctx): State<Arc<ServerContext>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    upgrade: WebSocketUpgrade,
) -> Result<axum::response::Response, Error> {
    let secret = params
        .get("secret")
        .cloned()
        .ok_or_else(|| Error::bad_request("missing secret query parameter"))?;
    ctx.operations
        .get(&id)
        .ok_or_else(|| Error::not_found(format!("no operation {id}")))?;
    let slots = ctx
        .operations
        .slots_of(&id)
        .ok_or_else(|| Error::bad_request("operation has no websockets"))?;
    let sender = slots.redeem(&secret).ok_or(Error::Forbidden)?;
    Ok(upgrade.on_upgrade(move |socket| async move {
        let _ = sender.send(socket);
    }))
}
