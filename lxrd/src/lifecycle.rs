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
use crate::operation::{blocking, Response, WsSlots};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

fn default_timeout() -> i64 {
    -1
}

#[derive(Deserialize, Debug)]
pub struct StateRequest {
    pub action: String,
    #[serde(default = "default_timeout")]
    pub timeout: i64,
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize, Debug, Default)]
pub struct ContainerPostRequest {
    pub name: Option<String>,
    pub host: Option<String>,
}

/// `PUT /containers/{name}/state`
pub async fn change_state(
    ctx: Arc<ServerContext>,
    name: String,
    request: StateRequest,
) -> Result<Response, Error> {
    let handle = ctx.handle_for(&name)?;
    let action = request.action.clone();
    match action.as_str() {
        "start" | "stop" | "restart" | "freeze" | "unfreeze" => {}
        other => return Err(Error::bad_request(format!("unknown action {other}"))),
    }

    let timeout = request.timeout;
    let force = request.force;
    ctx.operations.run_async(vec![name], None, async move {
        blocking(move || {
            match action.as_str() {
                "start" => handle.start()?,
                "stop" => handle.stop(timeout, force)?,
                "restart" => handle.reboot()?,
                "freeze" => handle.freeze()?,
                "unfreeze" => handle.unfreeze()?,
                _ => unreachable!(),
            }
            Ok(Value::Null)
        })
        .await
    })
}

/// `POST /containers/{name}`: a body with `name` renames, a body with
/// `host` turns the request into a live migration source.
pub async fn post_container(
    ctx: Arc<ServerContext>,
    name: String,
    request: ContainerPostRequest,
) -> Result<Response, Error> {
    if request.host.is_some() {
        return migration_source(ctx, name).await;
    }

    let Some(new_name) = request.name else {
        return Err(Error::bad_request("body carries neither name nor host"));
    };
    if new_name.contains('/') {
        return Err(Error::bad_request("container names may not contain /"));
    }

    let id = ctx.db.container_id_by_name(&name)?;
    if ctx.db.container_id_by_name(&new_name).is_ok() {
        return Err(Error::conflict(format!("{new_name} is already defined")));
    }

    let handle = ctx.handle_for(&name)?;
    let db = ctx.db.clone();
    ctx.operations.run_async(vec![name, new_name.clone()], None, async move {
        blocking(move || {
            handle.rename(&new_name)?;
            db.rename_container(id, &new_name)?;
            Ok(Value::Null)
        })
        .await
    })
}

async fn migration_source(ctx: Arc<ServerContext>, name: String) -> Result<Response, Error> {
    let handle = ctx.handle_for(&name)?;
    if !handle.running() {
        return Err(Error::bad_request("container is not running"));
    }
    let (slots, receivers) = WsSlots::new(&["control", "criu", "fs"]);
    ctx.operations.run_async(
        vec![name],
        Some(slots),
        crate::migration::source_body(handle, receivers),
    )
}

#[derive(Deserialize, Debug, Default)]
pub struct ContainerPutRequest {
    #[serde(default)]
    pub config: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub profiles: Vec<String>,
    #[serde(default)]
    pub devices: std::collections::HashMap<String, lxr::models::device::Device>,
    pub restore: Option<String>,
}

/// `PUT /containers/{name}`: replace config, profile bindings and devices in
/// one transaction; readers observe either the old or the new state.
pub async fn update_container(
    ctx: Arc<ServerContext>,
    name: String,
    request: ContainerPutRequest,
) -> Result<Response, Error> {
    if let Some(snapshot) = request.restore {
        return Err(Error::NotImplemented(format!(
            "restoring from {snapshot} is not supported yet"
        )));
    }
    let id = ctx.db.container_id_by_name(&name)?;
    let db = ctx.db.clone();
    ctx.operations.run_async(vec![name], None, async move {
        blocking(move || {
            db.replace_container_config(id, &request.config, &request.profiles, &request.devices)?;
            Ok(Value::Null)
        })
        .await
    })
}

/// `DELETE /containers/{name}`: drop the snapshot rows and directories, the
/// record, and the tree. Partial on-disk state from earlier crashes is
/// cleaned up rather than reported.
pub async fn delete_container(ctx: Arc<ServerContext>, name: String) -> Result<Response, Error> {
    let id = ctx.db.container_id_by_name(&name)?;
    if ctx.bare_handle(&name).running() {
        return Err(Error::bad_request("container is running"));
    }

    let dir = ctx.config.container_dir(&name);
    let db = ctx.db.clone();
    ctx.operations.run_async(vec![name.clone()], None, async move {
        blocking(move || {
            for (leaf, snapshot_id) in db.list_snapshots_of(&name)? {
                info!("removing snapshot {name}/{leaf}");
                db.delete_container(snapshot_id)?;
            }
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
