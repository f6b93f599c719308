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
use crate::errors::Error;
use crate::operation::{blocking, run_sync, Response};
use lxr::models::ContainerKind;
use serde::Deserialize;
use serde_json::{json, Value};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Deserialize, Debug, Default)]
pub struct SnapshotRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub stateful: bool,
}

#[derive(Deserialize, Debug)]
pub struct SnapshotRenameRequest {
    pub name: String,
}

fn snapshot_dir(ctx: &ServerContext, name: &str, leaf: &str) -> PathBuf {
    ctx.config.container_dir(name).join("snapshots").join(leaf)
}

/// `GET /containers/{name}/snapshots`
pub async fn list_snapshots(ctx: Arc<ServerContext>, name: String) -> Result<Response, Error> {
    ctx.db.container_id_by_name(&name)?;
    let snapshots = ctx.db.list_snapshots_of(&name)?;
    run_sync(|| {
        let urls: Vec<String> = snapshots
            .iter()
            .map(|(leaf, _)| format!("/1.0/containers/{name}/snapshots/{leaf}"))
            .collect();
        Ok(json!(urls))
    })
}

/// `POST /containers/{name}/snapshots`: directory first, then checkpoint,
/// row, rootfs mirror. Debris from a crash between the steps is what the
/// delete path tolerates.
pub async fn create_snapshot(
    ctx: Arc<ServerContext>,
    name: String,
    request: SnapshotRequest,
) -> Result<Response, Error> {
    let parent_id = ctx.db.container_id_by_name(&name)?;
    let leaf = match request.name {
        Some(leaf) => leaf,
        None => format!("snap{}", ctx.db.next_snapshot_index(&name)?),
    };
    if leaf.is_empty() || leaf.contains('/') {
        return Err(Error::bad_request("invalid snapshot name"));
    }
    let full_name = format!("{name}/{leaf}");
    if ctx.db.container_id_by_name(&full_name).is_ok() {
        return Err(Error::conflict(format!("{full_name} already exists")));
    }

    let dir = snapshot_dir(&ctx, &name, &leaf);
    std::fs::create_dir_all(&dir)?;
    std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;

    let handle = ctx.handle_for(&name)?;
    let stateful = request.stateful;
    let body_ctx = ctx.clone();
    ctx.operations.run_async(vec![name.clone()], None, async move {
        if stateful {
            let state_dir = dir.join("state");
            if state_dir.exists() {
                return Err(Error::conflict(format!(
                    "{} already exists",
                    state_dir.display()
                )));
            }
            if !handle.running() {
                return Err(Error::bad_request(
                    "stateful snapshot of a stopped container",
                ));
            }
            tokio::fs::create_dir_all(&state_dir).await?;
            let checkpoint_handle = handle;
            blocking(move || {
                checkpoint_handle.checkpoint(&state_dir, true, true)?;
                Ok(())
            })
            .await?;
        }

        let parent_config = body_ctx.db.load_config(parent_id)?;
        body_ctx
            .db
            .create_container(&full_name, ContainerKind::Snapshot, "x86_64", &parent_config)?;

        // -a keeps ownership, modes and device nodes intact
        let source = body_ctx.config.container_dir(&name).join("rootfs");
        info!("mirroring {} into {}", source.display(), dir.display());
        let status = tokio::process::Command::new("cp")
            .arg("-a")
            .arg(&source)
            .arg(dir.join("rootfs"))
            .status()
            .await?;
        if !status.success() {
            return Err(Error::Internal(anyhow::anyhow!(
                "cp exited with {status} copying {}",
                source.display()
            )));
        }
        Ok(Value::Null)
    })
}

/// `GET /containers/{name}/snapshots/{leaf}`
pub async fn describe_snapshot(
    ctx: Arc<ServerContext>,
    name: String,
    leaf: String,
) -> Result<Response, Error> {
    ctx.db.container_id_by_name(&format!("{name}/{leaf}"))?;
    let stateful = snapshot_dir(&ctx, &name, &leaf).join("state").exists();
    run_sync(|| Ok(json!({ "name": leaf, "stateful": stateful })))
}

/// `POST /containers/{name}/snapshots/{leaf}`. Renaming a stateful snapshot
/// is left unguarded even though checkpoint images embed absolute paths;
/// restoring one after a rename is unsupported.
pub async fn rename_snapshot(
    ctx: Arc<ServerContext>,
    name: String,
    leaf: String,
    request: SnapshotRenameRequest,
) -> Result<Response, Error> {
    let full_name = format!("{name}/{leaf}");
    let id = ctx.db.container_id_by_name(&full_name)?;

    let new_leaf = request.name;
    if new_leaf.is_empty() || new_leaf.contains('/') {
        return Err(Error::bad_request("invalid snapshot name"));
    }
    let new_full = format!("{name}/{new_leaf}");
    let new_dir = snapshot_dir(&ctx, &name, &new_leaf);
    if ctx.db.container_id_by_name(&new_full).is_ok() || new_dir.exists() {
        return Err(Error::conflict(format!("{new_full} already exists")));
    }

    let old_dir = snapshot_dir(&ctx, &name, &leaf);
    let db = ctx.db.clone();
    ctx.operations.run_async(vec![name], None, async move {
        blocking(move || {
            std::fs::rename(&old_dir, &new_dir)?;
            db.rename_container(id, &new_full)?;
            Ok(Value::Null)
        })
        .await
    })
}

/// `DELETE /containers/{name}/snapshots/{leaf}`: row first, then the tree.
pub async fn delete_snapshot(
    ctx: Arc<ServerContext>,
    name: String,
    leaf: String,
) -> Result<Response, Error> {
    let id = ctx.db.container_id_by_name(&format!("{name}/{leaf}"))?;
    let dir = snapshot_dir(&ctx, &name, &leaf);
    let db = ctx.db.clone();
    ctx.operations.run_async(vec![name], None, async move {
        blocking(move || {
            db.delete_container(id)?;
            if let Err(error) = std::fs::remove_dir_all(&dir) {
                if error.kind() != std::io::ErrorKind::NotFound {
                    return Err(error.into());
                }
                warn!("{} was already gone", dir.display());
            }
            Ok(Value::Null)
        })
        .await
    })
}
