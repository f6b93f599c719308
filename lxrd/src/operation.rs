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
use crate::errors::Error;
use lxr::util::{epoch_now_secs, gen_secret};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::watch::{channel, Receiver, Sender};
use tokio::sync::{oneshot, Mutex, OwnedMutexGuard};
use tracing::{error, info};
use uuid::Uuid;

#[derive(PartialEq, Eq, Clone, Debug)]
pub enum OperationStatus {
    InProgress,
    Completed,
    Fault(String),
}

impl OperationStatus {
    fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::InProgress => "running",
            OperationStatus::Completed => "success",
            OperationStatus::Fault(_) => "failure",
        }
    }
}

/// One asynchronous unit of work: status, the containers it touches, and a
/// terminal result of `{metadata, err}` shape.
#[derive(Clone, Debug)]
pub struct Operation {
    pub id: String,
    pub created_at: u64,
    pub containers: Vec<String>,
    pub status: OperationStatus,
    pub metadata: Value,
}

impl Operation {
    pub fn render(&self) -> Value {
        json!({
            "id": self.id,
            "created_at": self.created_at,
            "status": self.status.as_str(),
            "containers": self.containers,
            "metadata": self.metadata,
            "err": match &self.status {
                OperationStatus::Fault(reason) => Value::String(reason.clone()),
                _ => Value::Null,
            },
        })
    }
}

struct OperationHandle(Sender<Operation>);

impl OperationHandle {
    fn set_completed(&self, metadata: Value) {
        self.0.send_modify(|op| {
            op.status = OperationStatus::Completed;
            op.metadata = metadata;
        });
    }

    fn set_faulted(&self, reason: &str) {
        self.0.send_modify(|op| {
            op.status = OperationStatus::Fault(reason.to_string());
        });
    }
}

/// Per-channel secrets and the rendezvous senders of an operation's
/// websocket side-channels. Each slot is redeemable exactly once; the
/// matching receivers form the barrier the operation body waits on.
pub struct WsSlots<T> {
    secrets: Vec<(String, String)>,
    pending: StdMutex<HashMap<String, oneshot::Sender<T>>>,
}

impl<T: Send + 'static> WsSlots<T> {
    pub fn new(keys: &[&str]) -> (Arc<WsSlots<T>>, Vec<oneshot::Receiver<T>>) {
        let mut secrets = Vec::new();
        let mut pending = HashMap::new();
        let mut receivers = Vec::new();
        for key in keys {
            let secret = gen_secret();
            let (tx, rx) = oneshot::channel();
            pending.insert(secret.clone(), tx);
            secrets.push((key.to_string(), secret));
            receivers.push(rx);
        }
        (
            Arc::new(WsSlots {
                secrets,
                pending: StdMutex::new(pending),
            }),
            receivers,
        )
    }

    /// The map published as operation metadata: channel key to secret.
    pub fn metadata(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (key, secret) in self.secrets.iter() {
            map.insert(key.clone(), Value::String(secret.clone()));
        }
        Value::Object(map)
    }

    /// Claim the slot guarded by `secret`. Returns None for an unknown or
    /// already-redeemed secret.
    pub fn redeem(&self, secret: &str) -> Option<oneshot::Sender<T>> {
        self.pending.lock().unwrap().remove(secret)
    }
}

/// Run a blocking section of an operation body on the worker pool.
pub async fn blocking<T, F>(f: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|error| Error::Internal(anyhow::anyhow!("worker failed: {error}")))?
}

/// What a handler hands back to the router: a payload produced inline, or a
/// reference to a freshly scheduled operation.
#[derive(Debug)]
pub enum Response {
    Sync(Value),
    Async { operation: String, metadata: Value },
}

/// Run `body` on the handler's thread and wrap its payload.
pub fn run_sync<F>(body: F) -> Result<Response, Error>
where
    F: FnOnce() -> Result<Value, Error>,
{
    body().map(Response::Sync)
}

type SlotStore = Arc<StdMutex<HashMap<String, Arc<WsSlots<axum::extract::ws::WebSocket>>>>>;

/// The operation registry. Async bodies run on their own worker; operations
/// naming the same container are serialized through a per-name mutex, two
/// operations on different containers proceed concurrently.
#[derive(Clone, Default)]
pub struct Operations {
    registry: Arc<StdMutex<HashMap<String, Receiver<Operation>>>>,
    slots: SlotStore,
    locks: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Operations {
    pub fn new() -> Operations {
        Operations::default()
    }

    pub fn get(&self, id: &str) -> Option<Operation> {
        let registry = self.registry.lock().unwrap();
        registry.get(id).map(|rx| rx.borrow().clone())
    }

    /// Block until the operation reaches a terminal state.
    pub async fn wait(&self, id: &str) -> Option<Operation> {
        let mut rx = {
            let registry = self.registry.lock().unwrap();
            registry.get(id).cloned()?
        };
        loop {
            let current = rx.borrow().clone();
            if current.status != OperationStatus::InProgress {
                return Some(current);
            }
            if rx.changed().await.is_err() {
                let current = rx.borrow().clone();
                return Some(current);
            }
        }
    }

    pub fn slots_of(&self, id: &str) -> Option<Arc<WsSlots<axum::extract::ws::WebSocket>>> {
        self.slots.lock().unwrap().get(id).cloned()
    }

    fn container_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn lock_containers(&self, containers: &[String]) -> Vec<OwnedMutexGuard<()>> {
        // lock in sorted order so two operations over an overlapping set of
        // containers cannot deadlock each other
        let mut names: Vec<&String> = containers.iter().collect();
        names.sort();
        names.dedup();
        let mut guards = Vec::new();
        for name in names {
            guards.push(self.container_lock(name).lock_owned().await);
        }
        guards
    }

    /// Schedule `body` on a background worker and return the operation
    /// reference immediately. When the operation carries websocket slots,
    /// their secret map is the operation's initial metadata.
    pub fn run_async<F>(
        &self,
        containers: Vec<String>,
        slots: Option<Arc<WsSlots<axum::extract::ws::WebSocket>>>,
        body: F,
    ) -> Result<Response, Error>
    where
        F: Future<Output = Result<Value, Error>> + Send + 'static,
    {
        let id = Uuid::new_v4().to_string();
        let metadata = slots
            .as_ref()
            .map(|s| s.metadata())
            .unwrap_or(Value::Null);

        let (sender, rx) = channel(Operation {
            id: id.clone(),
            created_at: epoch_now_secs(),
            containers: containers.clone(),
            status: OperationStatus::InProgress,
            metadata: metadata.clone(),
        });

        self.registry.lock().unwrap().insert(id.clone(), rx);
        if let Some(slots) = slots {
            self.slots.lock().unwrap().insert(id.clone(), slots);
        }

        let this = self.clone();
        let op_id = id.clone();
        tokio::spawn(async move {
            let handle = OperationHandle(sender);
            let _guards = this.lock_containers(&containers).await;
            match body.await {
                Ok(value) => {
                    info!("operation {op_id} completed");
                    handle.set_completed(value);
                }
                Err(err) => {
                    error!("operation {op_id} failed: {err}");
                    handle.set_faulted(&err.to_string());
                }
            }
        });

        Ok(Response::Async {
            operation: id,
            metadata,
        })
    }
}
