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
use crate::operation::{blocking, Response};
use crate::store::StoreError;
use lxr::models::ContainerKind;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Deserialize, Debug)]
pub struct CreateRequest {
    pub name: Option<String>,
    pub source: Source,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub profiles: Vec<String>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Source {
    Image {
        alias: Option<String>,
        fingerprint: Option<String>,
    },
    None {},
    Migration {
        mode: String,
        operation: String,
        #[serde(default)]
        secrets: HashMap<String, String>,
    },
}

/// `POST /containers`
pub async fn create_container(
    ctx: Arc<ServerContext>,
    request: CreateRequest,
) -> Result<Response, Error> {
    let Some(name) = request.name else {
        return Err(Error::bad_request("container name is required"));
    };
    if name.is_empty() || name.contains('/') {
        return Err(Error::bad_request("invalid container name"));
    }

    match request.source {
        Source::Image { alias, fingerprint } => {
            from_image(ctx, name, alias, fingerprint, request.config).await
        }
        Source::None {} => from_nothing(ctx, name, request.config).await,
        Source::Migration {
            mode,
            operation,
            secrets,
        } => from_migration(ctx, name, mode, operation, secrets, request.config).await,
    }
}

fn resolve_image(
    ctx: &ServerContext,
    alias: Option<String>,
    fingerprint: Option<String>,
) -> Result<String, Error> {
    match (alias, fingerprint) {
        (Some(alias), None) => {
            let image_id = ctx
                .db
                .image_id_by_alias(&alias)
                .map_err(|_| Error::bad_request(format!("unknown image alias {alias}")))?;
            ctx.db
                .image_fingerprint_by_id(image_id)
                .map_err(|_| Error::bad_request(format!("stale alias {alias}")))
        }
        (None, Some(fingerprint)) => {
            if !ctx.db.image_fingerprint_exists(&fingerprint)? {
                return Err(Error::bad_request(format!("unknown image {fingerprint}")));
            }
            Ok(fingerprint)
        }
        _ => Err(Error::bad_request(
            "image source requires exactly one of alias or fingerprint",
        )),
    }
}

/// Make the container directory with its empty rootfs, both 0700. The
/// directory pre-existing is a conflict, not something to adopt.
fn provision_dir(ctx: &ServerContext, name: &str) -> Result<(), Error> {
    let dir = ctx.config.container_dir(name);
    if dir.exists() {
        return Err(Error::conflict(format!(
            "container directory for {name} already exists"
        )));
    }
    std::fs::create_dir_all(dir.join("rootfs"))?;
    for path in [&dir, &dir.join("rootfs")] {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Undo half-made containers: best effort, both the row and the tree.
pub(crate) fn scrub_container(ctx: &ServerContext, name: &str) {
    if let Ok(id) = ctx.db.container_id_by_name(name) {
        if let Err(error) = ctx.db.delete_container(id) {
            error!("cannot remove container record for {name}: {error}");
        }
    }
    let dir = ctx.config.container_dir(name);
    if let Err(error) = std::fs::remove_dir_all(&dir) {
        if error.kind() != std::io::ErrorKind::NotFound {
            error!("cannot remove {}: {error}", dir.display());
        }
    }
}

async fn from_image(
    ctx: Arc<ServerContext>,
    name: String,
    alias: Option<String>,
    fingerprint: Option<String>,
    config: BTreeMap<String, String>,
) -> Result<Response, Error> {
    let fingerprint = resolve_image(&ctx, alias, fingerprint)?;
    provision_dir(&ctx, &name)?;

    if let Err(error) = ctx
        .db
        .create_container(&name, ContainerKind::Regular, "x86_64", &config)
    {
        let _ = std::fs::remove_dir_all(ctx.config.container_dir(&name));
        return Err(match error {
            StoreError::AlreadyDefined => Error::conflict(format!("{name} is already defined")),
            other => other.into(),
        });
    }

    let body_ctx = ctx.clone();
    let body_name = name.clone();
    ctx.operations.run_async(vec![name], None, async move {
        let result = populate_rootfs(&body_ctx, &body_name, &fingerprint).await;
        if let Err(error) = result {
            scrub_container(&body_ctx, &body_name);
            return Err(error);
        }
        Ok(Value::Null)
    })
}

async fn from_nothing(
    ctx: Arc<ServerContext>,
    name: String,
    config: BTreeMap<String, String>,
) -> Result<Response, Error> {
    match ctx
        .db
        .create_container(&name, ContainerKind::Regular, "x86_64", &config)
    {
        Err(StoreError::AlreadyDefined) => {
            Err(Error::conflict(format!("{name} is already defined")))
        }
        Err(other) => Err(other.into()),
        // the rootfs is whatever the caller provisioned, nothing left to do
        Ok(_) => ctx
            .operations
            .run_async(vec![name], None, async move { Ok(Value::Null) }),
    }
}

async fn from_migration(
    ctx: Arc<ServerContext>,
    name: String,
    mode: String,
    operation: String,
    secrets: HashMap<String, String>,
    config: BTreeMap<String, String>,
) -> Result<Response, Error> {
    if mode != "pull" {
        return Err(Error::NotImplemented(format!(
            "migration mode {mode} is not supported"
        )));
    }

    provision_dir(&ctx, &name)?;
    if let Err(error) = ctx
        .db
        .create_container(&name, ContainerKind::Regular, "x86_64", &config)
    {
        let _ = std::fs::remove_dir_all(ctx.config.container_dir(&name));
        return Err(match error {
            StoreError::AlreadyDefined => Error::conflict(format!("{name} is already defined")),
            other => other.into(),
        });
    }

    let prepared = ctx
        .handle_for(&name)
        .and_then(|handle| Ok((handle, crate::migration::client_tls(&ctx.config)?)));
    let (handle, connector) = match prepared {
        Ok(prepared) => prepared,
        Err(error) => {
            scrub_container(&ctx, &name);
            return Err(error);
        }
    };

    let body_ctx = ctx.clone();
    let body_name = name.clone();
    ctx.operations.run_async(vec![name], None, async move {
        let sink = crate::migration::MigrationSink {
            operation_url: operation,
            secrets,
            connector,
        };
        if let Err(error) = crate::migration::sink_body(&sink, &handle).await {
            scrub_container(&body_ctx, &body_name);
            return Err(error);
        }
        Ok(Value::Null)
    })
}

/// Flags handed to tar per detected compression of the image file.
fn extractor_flags(image: &Path) -> Vec<&'static str> {
    let mut magic = [0u8; 6];
    let sniffed = std::fs::File::open(image)
        .and_then(|mut file| std::io::Read::read(&mut file, &mut magic))
        .unwrap_or(0);
    let magic = &magic[..sniffed];

    if magic.starts_with(&[0x1f, 0x8b]) {
        vec!["-zxf"]
    } else if magic.starts_with(b"BZh") {
        vec!["--jxf"]
    } else if magic.starts_with(&[0x5d, 0x00, 0x00]) {
        vec!["--lzma", "-xf"]
    } else if magic.starts_with(&[0xfd, b'7', b'z', b'X', b'Z']) {
        vec!["-Jxf"]
    } else if sniffed == 6 && tar_header(image) {
        vec!["-xf"]
    } else {
        // unknowns are treated as xz, the common case for published images
        vec!["-Jxf"]
    }
}

fn tar_header(image: &Path) -> bool {
    use std::io::{Read, Seek, SeekFrom};
    let Ok(mut file) = std::fs::File::open(image) else {
        return false;
    };
    let mut ustar = [0u8; 5];
    file.seek(SeekFrom::Start(257))
        .and_then(|_| file.read_exact(&mut ustar))
        .map(|_| &ustar == b"ustar")
        .unwrap_or(false)
}

async fn populate_rootfs(
    ctx: &ServerContext,
    name: &str,
    fingerprint: &str,
) -> Result<(), Error> {
    let image = ctx.config.images_path().join(fingerprint);
    let dir = ctx.config.container_dir(name);

    let flags = extractor_flags(&image);
    info!("extracting {} into {}", image.display(), dir.display());
    let status = tokio::process::Command::new("tar")
        .args(&flags)
        .arg(&image)
        .arg("-C")
        .arg(&dir)
        .arg("--numeric-owner")
        .arg("rootfs")
        .status()
        .await?;
    if !status.success() {
        return Err(Error::Internal(anyhow::anyhow!(
            "tar exited with {status} extracting {}",
            image.display()
        )));
    }

    let rootfs = dir.join("rootfs");
    let uid_base = ctx.config.idmap_base;
    let gid_base = ctx.config.idmap_base;
    blocking(move || Ok(shift_tree(&rootfs, uid_base, gid_base)?)).await?;

    // a traversal ACL lets the mapped root reach its rootfs; refusal is
    // filesystem-dependent and the container may still work without it
    let acl = tokio::process::Command::new("setfacl")
        .arg("-m")
        .arg(format!("user:{uid_base}:rx"))
        .arg(&dir)
        .status()
        .await;
    match acl {
        Ok(status) if status.success() => {}
        Ok(status) => warn!("setfacl on {} exited with {status}", dir.display()),
        Err(error) => warn!("cannot run setfacl on {}: {error}", dir.display()),
    }

    Ok(())
}

/// Offset every uid/gid under `path` by the daemon's id-map base. Symlinks
/// are re-owned, never followed.
fn shift_tree(path: &Path, uid_base: u32, gid_base: u32) -> std::io::Result<()> {
    use nix::unistd::{Gid, Uid};

    fn chown_one(path: &Path, uid_base: u32, gid_base: u32) -> std::io::Result<()> {
        let meta = std::fs::symlink_metadata(path)?;
        let (uid, gid) = {
            use std::os::unix::fs::MetadataExt;
            (meta.uid(), meta.gid())
        };
        nix::unistd::fchownat(
            None,
            path,
            Some(Uid::from_raw(uid + uid_base)),
            Some(Gid::from_raw(gid + gid_base)),
            nix::unistd::FchownatFlags::NoFollowSymlink,
        )
        .map_err(std::io::Error::from)
    }

    chown_one(path, uid_base, gid_base)?;
    if path.is_dir() && !path.is_symlink() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let entry_path = entry.path();
            if entry.file_type()?.is_dir() {
                shift_tree(&entry_path, uid_base, gid_base)?;
            } else {
                chown_one(&entry_path, uid_base, gid_base)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{OperationStatus, Response};
    use crate::test_support::test_context;

    async fn wait_op(ctx: &Arc<ServerContext>, response: Response) -> crate::operation::Operation {
        let Response::Async { operation, .. } = response else {
            panic!("expected async response");
        };
        ctx.operations.wait(&operation).await.unwrap()
    }

    fn request(name: &str, source: Source, config: &[(&str, &str)]) -> CreateRequest {
        CreateRequest {
            name: Some(name.to_string()),
            source,
            config: config
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            profiles: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_source_none_round_trip() {
        let (ctx, _dir, _driver) = test_context();
        let response = create_container(
            ctx.clone(),
            request("a", Source::None {}, &[("user.x", "1")]),
        )
        .await
        .unwrap();
        let op = wait_op(&ctx, response).await;
        assert_eq!(op.status, OperationStatus::Completed);
        let id = ctx.db.container_id_by_name("a").unwrap();
        let config = ctx.db.load_config(id).unwrap();
        assert_eq!(config.len(), 1);
        assert_eq!(config["user.x"], "1");
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let (ctx, _dir, _driver) = test_context();
        create_container(ctx.clone(), request("a", Source::None {}, &[]))
            .await
            .unwrap();
        let second = create_container(ctx.clone(), request("a", Source::None {}, &[])).await;
        assert!(matches!(second, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_missing_name_rejected() {
        let (ctx, _dir, _driver) = test_context();
        let result = create_container(
            ctx.clone(),
            CreateRequest {
                name: None,
                source: Source::None {},
                config: BTreeMap::new(),
                profiles: Vec::new(),
            },
        )
        .await;
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_image_source_requires_exactly_one_reference() {
        let (ctx, _dir, _driver) = test_context();
        let result = create_container(
            ctx.clone(),
            request(
                "a",
                Source::Image {
                    alias: None,
                    fingerprint: None,
                },
                &[],
            ),
        )
        .await;
        assert!(matches!(result, Err(Error::BadRequest(_))));

        let result = create_container(
            ctx.clone(),
            request(
                "a",
                Source::Image {
                    alias: Some("ubuntu".to_string()),
                    fingerprint: Some("abc".to_string()),
                },
                &[],
            ),
        )
        .await;
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_unknown_alias_rejected() {
        let (ctx, _dir, _driver) = test_context();
        let result = create_container(
            ctx.clone(),
            request(
                "a",
                Source::Image {
                    alias: Some("nope".to_string()),
                    fingerprint: None,
                },
                &[],
            ),
        )
        .await;
        assert!(matches!(result, Err(Error::BadRequest(_))));
        // nothing was left behind
        assert!(!ctx.config.container_dir("a").exists());
        assert!(ctx.db.container_id_by_name("a").is_err());
    }

    #[tokio::test]
    async fn test_existing_directory_conflicts() {
        let (ctx, _dir, _driver) = test_context();
        ctx.db
            .execute("insert into images (fingerprint) values ('abc')", [])
            .unwrap();
        std::fs::create_dir_all(ctx.config.container_dir("a")).unwrap();
        let result = create_container(
            ctx.clone(),
            request(
                "a",
                Source::Image {
                    alias: None,
                    fingerprint: Some("abc".to_string()),
                },
                &[],
            ),
        )
        .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_migration_push_not_implemented() {
        let (ctx, _dir, _driver) = test_context();
        let result = create_container(
            ctx.clone(),
            request(
                "a",
                Source::Migration {
                    mode: "push".to_string(),
                    operation: "wss://peer/1.0/operations/xyz".to_string(),
                    secrets: HashMap::new(),
                },
            &[],
            ),
        )
        .await;
        assert!(matches!(result, Err(Error::NotImplemented(_))));
    }

    #[test]
    fn test_extractor_flags_by_magic() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, bytes: &[u8]| {
            let path = dir.path().join(name);
            std::fs::write(&path, bytes).unwrap();
            path
        };
        assert_eq!(
            extractor_flags(&write("gz", &[0x1f, 0x8b, 0, 0, 0, 0])),
            vec!["-zxf"]
        );
        assert_eq!(
            extractor_flags(&write("bz2", b"BZh91AY")),
            vec!["--jxf"]
        );
        assert_eq!(
            extractor_flags(&write("xz", &[0xfd, b'7', b'z', b'X', b'Z', 0x00])),
            vec!["-Jxf"]
        );
        assert_eq!(
            extractor_flags(&write("lzma", &[0x5d, 0x00, 0x00, 0x80, 0x00, 0x00])),
            vec!["--lzma", "-xf"]
        );
        // an unknown blob falls back to xz
        assert_eq!(
            extractor_flags(&write("mystery", b"abcdef")),
            vec!["-Jxf"]
        );
        // plain tar: ustar magic at offset 257
        let mut tar = vec![0u8; 512];
        tar[257..262].copy_from_slice(b"ustar");
        assert_eq!(extractor_flags(&write("tar", &tar)), vec!["-xf"]);
    }

    #[test]
    fn test_provision_dir_modes() {
        let (ctx, _dir, _driver) = test_context();
        provision_dir(&ctx, "a").unwrap();
        let meta = std::fs::metadata(ctx.config.container_dir("a")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o7777, 0o700);
        assert!(provision_dir(&ctx, "a").is_err());
    }
}
