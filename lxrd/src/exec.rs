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
use crate::fdio::AsyncFdIo;
use crate::operation::{blocking, Response, WsSlots};
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use lxr::models::exec::{AttachSpec, AttachStdio};
use lxr::runtime::Handle;
use nix::pty::openpty;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Deserialize, Debug)]
pub struct ExecRequest {
    pub command: Vec<String>,
    #[serde(rename = "wait-for-websocket", default)]
    pub wait_for_websocket: bool,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

/// `POST /containers/{name}/exec`
pub async fn exec_container(
    ctx: Arc<ServerContext>,
    name: String,
    request: ExecRequest,
) -> Result<Response, Error> {
    if request.command.is_empty() {
        return Err(Error::bad_request("no command specified"));
    }
    let handle = ctx.handle_for(&name)?;
    if !handle.running() {
        return Err(Error::bad_request("container is not running"));
    }

    let command = request.command;
    let envs = request.environment;

    if !request.wait_for_websocket {
        return ctx.operations.run_async(vec![name], None, async move {
            blocking(move || {
                let devnull = std::fs::OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open("/dev/null")?;
                let fd = devnull.as_raw_fd();
                let spec = AttachSpec::new(
                    command,
                    envs,
                    AttachStdio::Forward {
                        stdin: fd,
                        stdout: fd,
                        stderr: fd,
                    },
                );
                let status = handle.attach(&spec)?;
                Ok(json!({ "return": status }))
            })
            .await
        });
    }

    if request.interactive {
        let (slots, receivers) = WsSlots::new(&["0"]);
        ctx.operations.run_async(
            vec![name],
            Some(slots),
            interactive_body(handle, command, envs, receivers),
        )
    } else {
        let (slots, receivers) = WsSlots::new(&["0", "1", "2"]);
        ctx.operations.run_async(
            vec![name],
            Some(slots),
            piped_body(handle, command, envs, receivers),
        )
    }
}

/// The rendezvous: nothing runs until every published secret has been
/// redeemed and its websocket bound.
async fn collect_sockets(
    receivers: Vec<oneshot::Receiver<WebSocket>>,
) -> Result<Vec<WebSocket>, Error> {
    let mut sockets = Vec::new();
    for receiver in receivers {
        let socket = receiver
            .await
            .map_err(|_| Error::Internal(anyhow::anyhow!("websocket slot abandoned")))?;
        sockets.push(socket);
    }
    Ok(sockets)
}

async fn fd_to_ws(source: &AsyncFdIo, sink: &mut SplitSink<WebSocket, Message>) {
    let mut buf = [0u8; 4096];
    loop {
        match source.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if sink.send(Message::Binary(buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

async fn ws_to_fd(source: &mut SplitStream<WebSocket>, sink: &AsyncFdIo) {
    while let Some(message) = source.next().await {
        let written = match message {
            Ok(Message::Binary(bytes)) => sink.write_all(&bytes).await,
            Ok(Message::Text(text)) => sink.write_all(text.as_bytes()).await,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => Ok(()),
        };
        if written.is_err() {
            break;
        }
    }
}

/// One pty, one websocket: the subordinate end carries the command's stdio,
/// the controlling end is mirrored both ways to the client.
async fn interactive_body(
    handle: Handle,
    command: Vec<String>,
    envs: HashMap<String, String>,
    receivers: Vec<oneshot::Receiver<WebSocket>>,
) -> Result<Value, Error> {
    let mut sockets = collect_sockets(receivers).await?;
    let ws = sockets.remove(0);

    let pty = openpty(None, None).map_err(std::io::Error::from)?;
    let master = Arc::new(AsyncFdIo::new(pty.master)?);
    let subordinate = pty.slave;
    let spec = AttachSpec::new(
        command,
        envs,
        AttachStdio::Terminal {
            tty: subordinate.as_raw_fd(),
        },
    );

    let attach = tokio::task::spawn_blocking(move || {
        let status = handle.attach(&spec);
        // command is gone; releasing the subordinate end EOFs the master
        drop(subordinate);
        status
    });

    let (mut tx, mut rx) = ws.split();
    let input_master = master.clone();
    let client_input = tokio::spawn(async move {
        ws_to_fd(&mut rx, &input_master).await;
    });
    let output = fd_to_ws(&master, &mut tx);
    let (joined, ()) = tokio::join!(attach, output);
    client_input.abort();
    let status =
        joined.map_err(|error| Error::Internal(anyhow::anyhow!("worker failed: {error}")))??;

    Ok(json!({ "return": status }))
}

/// Three pipes, three websockets: slot 0 feeds stdin, slots 1 and 2 drain
/// stdout and stderr.
async fn piped_body(
    handle: Handle,
    command: Vec<String>,
    envs: HashMap<String, String>,
    receivers: Vec<oneshot::Receiver<WebSocket>>,
) -> Result<Value, Error> {
    let mut sockets = collect_sockets(receivers).await?;
    let ws_stderr = sockets.pop().expect("stderr slot");
    let ws_stdout = sockets.pop().expect("stdout slot");
    let ws_stdin = sockets.pop().expect("stdin slot");

    let (in_read, in_write) = nix::unistd::pipe().map_err(std::io::Error::from)?;
    let (out_read, out_write) = nix::unistd::pipe().map_err(std::io::Error::from)?;
    let (err_read, err_write) = nix::unistd::pipe().map_err(std::io::Error::from)?;

    let spec = AttachSpec::new(
        command,
        envs,
        AttachStdio::Forward {
            stdin: in_read.as_raw_fd(),
            stdout: out_write.as_raw_fd(),
            stderr: err_write.as_raw_fd(),
        },
    );

    let attach = tokio::task::spawn_blocking(move || {
        let status = handle.attach(&spec);
        // dropping the child-side ends here lets the readers EOF once the
        // command's own duplicates are closed
        drop(in_read);
        drop(out_write);
        drop(err_write);
        status
    });

    let stdin_sink = AsyncFdIo::new(unsafe { OwnedFd::from_raw_fd(in_write) })?;
    let stdout_source = AsyncFdIo::new(unsafe { OwnedFd::from_raw_fd(out_read) })?;
    let stderr_source = AsyncFdIo::new(unsafe { OwnedFd::from_raw_fd(err_read) })?;

    let (_, mut stdin_rx) = ws_stdin.split();
    let stdin_pump = tokio::spawn(async move {
        ws_to_fd(&mut stdin_rx, &stdin_sink).await;
        drop(stdin_sink);
    });

    let (mut stdout_tx, _) = ws_stdout.split();
    let (mut stderr_tx, _) = ws_stderr.split();
    let stdout_pump = fd_to_ws(&stdout_source, &mut stdout_tx);
    let stderr_pump = fd_to_ws(&stderr_source, &mut stderr_tx);

    let (joined, (), ()) = tokio::join!(attach, stdout_pump, stderr_pump);
    stdin_pump.abort();
    let status = joined.map_err(|error| Error::Internal(anyhow::anyhow!("worker failed: {error}")))??;

    Ok(json!({ "return": status }))
}
