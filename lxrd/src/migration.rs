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
use crate::config::LxrdConfig;
use crate::errors::Error;
use crate::operation::blocking;
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures::StreamExt;
use lxr::runtime::Handle;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

const CHUNK: usize = 16 * 1024;

type ClientWs = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Client-side TLS for dialing a peer daemon. Peers authenticate with the
/// daemon certificate; their own certificates are self-signed, so no chain
/// verification is attempted.
pub fn client_tls(config: &LxrdConfig) -> Result<native_tls::TlsConnector, Error> {
    let cert = std::fs::read(&config.tls_cert)?;
    let key = std::fs::read(&config.tls_key)?;
    let identity = native_tls::Identity::from_pkcs8(&cert, &key)
        .map_err(|error| Error::Internal(anyhow::anyhow!("cannot load client identity: {error}")))?;
    native_tls::TlsConnector::builder()
        .identity(identity)
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|error| Error::Internal(anyhow::anyhow!("cannot build tls connector: {error}")))
}

/// The receiving half of a pull migration: the peer's operation URL, the
/// per-channel secrets it published, and the dialer credentials.
pub struct MigrationSink {
    pub operation_url: String,
    pub secrets: HashMap<String, String>,
    pub connector: native_tls::TlsConnector,
}

async fn dial(sink: &MigrationSink, channel: &str) -> Result<ClientWs, Error> {
    let secret = sink
        .secrets
        .get(channel)
        .ok_or_else(|| Error::bad_request(format!("missing secret for channel {channel}")))?;
    let url = format!("{}/websocket?secret={secret}", sink.operation_url);
    let request = url
        .clone()
        .into_client_request()
        .map_err(|error| Error::bad_request(format!("bad operation url: {error}")))?;
    let (stream, _) = connect_async_tls_with_config(
        request,
        None,
        false,
        Some(Connector::NativeTls(sink.connector.clone())),
    )
    .await
    .map_err(|error| Error::Internal(anyhow::anyhow!("cannot connect {url}: {error}")))?;
    Ok(stream)
}

/// Pull the checkpoint images and the rootfs from the source, then wait for
/// its verdict on the control channel.
pub async fn sink_body(sink: &MigrationSink, handle: &Handle) -> Result<Value, Error> {
    let mut control = dial(sink, "control").await?;
    let criu = dial(sink, "criu").await?;
    let fs = dial(sink, "fs").await?;

    let state_dir = handle.container_dir().join("state");
    tokio::fs::create_dir_all(&state_dir).await?;
    receive_tar(criu, &state_dir).await?;
    receive_tar(fs, &handle.rootfs_path()).await?;

    // the source reports after it finished streaming
    while let Some(message) = control.next().await {
        match message {
            Ok(WsMessage::Text(text)) => {
                let verdict: Value = serde_json::from_str(&text)
                    .map_err(|error| Error::Internal(anyhow::anyhow!("bad control message: {error}")))?;
                if verdict.get("success").and_then(Value::as_bool) == Some(true) {
                    info!("migration of {} finished", handle.name());
                    return Ok(Value::Null);
                }
                let reason = verdict
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown source failure");
                return Err(Error::Internal(anyhow::anyhow!(
                    "source aborted migration: {reason}"
                )));
            }
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
    Err(Error::Internal(anyhow::anyhow!(
        "source closed the control channel without a verdict"
    )))
}

/// The sending half: checkpoint, then stream state and rootfs to whoever
/// bound the operation's websockets.
pub async fn source_body(
    handle: Handle,
    receivers: Vec<oneshot::Receiver<WebSocket>>,
) -> Result<Value, Error> {
    let mut receivers = receivers.into_iter();
    let mut sockets = Vec::new();
    for receiver in receivers.by_ref() {
        let socket = receiver
            .await
            .map_err(|_| Error::Internal(anyhow::anyhow!("websocket slot abandoned")))?;
        sockets.push(socket);
    }
    let mut drain = sockets.into_iter();
    let mut control = drain.next().expect("control slot");
    let criu = drain.next().expect("criu slot");
    let fs = drain.next().expect("fs slot");

    let state_dir = handle
        .container_dir()
        .join(format!(".migration-{}", lxr::util::gen_id()));
    tokio::fs::create_dir_all(&state_dir).await?;

    let checkpoint_dir = state_dir.clone();
    let handle = Arc::new(handle);
    let checkpoint_handle = handle.clone();
    let result: Result<(), Error> = async {
        blocking(move || {
            checkpoint_handle.checkpoint(&checkpoint_dir, true, true)?;
            Ok(())
        })
        .await?;
        send_tar(&state_dir, criu).await?;
        send_tar(&handle.rootfs_path(), fs).await?;
        Ok(())
    }
    .await;

    let verdict = match &result {
        Ok(()) => json!({"success": true}),
        Err(error) => json!({"success": false, "message": error.to_string()}),
    };
    let _ = control
        .send(AxumMessage::Text(verdict.to_string()))
        .await;
    let _ = control.send(AxumMessage::Close(None)).await;

    if let Err(error) = tokio::fs::remove_dir_all(&state_dir).await {
        warn!("cannot remove {}: {error}", state_dir.display());
    }
    result.map(|_| Value::Null)
}

/// tar the directory to stdout and relay it as binary frames.
async fn send_tar(dir: &Path, mut ws: WebSocket) -> Result<(), Error> {
    let mut child = tokio::process::Command::new("tar")
        .arg("-cf")
        .arg("-")
        .arg("-C")
        .arg(dir)
        .arg(".")
        .stdout(Stdio::piped())
        .spawn()?;
    let mut stdout = child.stdout.take().expect("piped stdout");

    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = stdout.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        ws.send(AxumMessage::Binary(buf[..n].to_vec()))
            .await
            .map_err(|error| Error::Internal(anyhow::anyhow!("peer went away: {error}")))?;
    }
    let status = child.wait().await?;
    if !status.success() {
        return Err(Error::Internal(anyhow::anyhow!(
            "tar exited with {status} archiving {}",
            dir.display()
        )));
    }
    let _ = ws.send(AxumMessage::Close(None)).await;
    Ok(())
}

/// Unpack binary frames through tar into the directory.
async fn receive_tar(mut ws: ClientWs, dir: &Path) -> Result<(), Error> {
    let mut child = tokio::process::Command::new("tar")
        .arg("-xf")
        .arg("-")
        .arg("-C")
        .arg(dir)
        .stdin(Stdio::piped())
        .spawn()?;
    let mut stdin = child.stdin.take().expect("piped stdin");

    while let Some(message) = ws.next().await {
        match message {
            Ok(WsMessage::Binary(bytes)) => stdin.write_all(&bytes).await?,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                return Err(Error::Internal(anyhow::anyhow!(
                    "transfer interrupted: {error}"
                )))
            }
        }
    }
    drop(stdin);
    let status = child.wait().await?;
    if !status.success() {
        return Err(Error::Internal(anyhow::anyhow!(
            "tar exited with {status} unpacking into {}",
            dir.display()
        )));
    }
    Ok(())
}
