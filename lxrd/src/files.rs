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
use lxr::util::{confine_path, format_mode};
use std::path::PathBuf;
use std::sync::Arc;

pub const UID_HEADER: &str = "X-LXD-uid";
pub const GID_HEADER: &str = "X-LXD-gid";
pub const MODE_HEADER: &str = "X-LXD-mode";

pub struct FileContent {
    pub uid: u32,
    pub gid: u32,
    pub mode: String,
    pub body: Vec<u8>,
}

pub struct FileMeta {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

impl Default for FileMeta {
    fn default() -> FileMeta {
        FileMeta {
            uid: 0,
            gid: 0,
            mode: 0o644,
        }
    }
}

pub fn parse_mode(text: &str) -> Result<u32, Error> {
    u32::from_str_radix(text, 8)
        .map_err(|_| Error::bad_request(format!("bad mode {text:?}, expected octal digits")))
}

/// While the container runs, files are read and written through its init
/// process's root so mounts inside the container are visible; stopped
/// containers expose the on-disk rootfs.
fn effective_root(ctx: &ServerContext, name: &str) -> PathBuf {
    let handle = ctx.bare_handle(name);
    if handle.running() {
        if let Some(pid) = handle.init_pid() {
            return PathBuf::from(format!("/proc/{pid}/root"));
        }
    }
    handle.rootfs_path()
}

fn resolve(ctx: &ServerContext, name: &str, path: &str) -> Result<PathBuf, Error> {
    ctx.db.container_id_by_name(name)?;
    let root = effective_root(ctx, name);
    confine_path(&root, path)
        .ok_or_else(|| Error::bad_request(format!("{path:?} escapes the container rootfs")))
}

/// `GET /containers/{name}/files?path=`
pub async fn fetch(ctx: Arc<ServerContext>, name: &str, path: &str) -> Result<FileContent, Error> {
    let target = resolve(&ctx, name, path)?;
    let meta = tokio::fs::metadata(&target).await.map_err(|error| {
        if error.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(format!("{path} does not exist"))
        } else {
            error.into()
        }
    })?;
    if !meta.is_file() {
        return Err(Error::bad_request(format!("{path} is not a regular file")));
    }
    let body = tokio::fs::read(&target).await?;
    let (uid, gid, mode) = {
        use std::os::unix::fs::MetadataExt;
        (meta.uid(), meta.gid(), meta.mode())
    };
    Ok(FileContent {
        uid,
        gid,
        mode: format_mode(mode),
        body,
    })
}

/// `POST /containers/{name}/files?path=`
pub async fn store(
    ctx: Arc<ServerContext>,
    name: &str,
    path: &str,
    meta: FileMeta,
    body: &[u8],
) -> Result<(), Error> {
    let target = resolve(&ctx, name, path)?;
    let bytes = body.to_vec();
    tokio::task::spawn_blocking(move || -> Result<(), Error> {
        use std::os::unix::fs::DirBuilderExt;
        if let Some(parent) = target.parent() {
            if !parent.exists() {
                std::fs::DirBuilder::new()
                    .recursive(true)
                    .mode(meta.mode)
                    .create(parent)?;
            }
        }
        std::fs::write(&target, &bytes)?;
        std::fs::set_permissions(
            &target,
            std::os::unix::fs::PermissionsExt::from_mode(meta.mode),
        )?;
        nix::unistd::chown(
            &target,
            Some(nix::unistd::Uid::from_raw(meta.uid)),
            Some(nix::unistd::Gid::from_raw(meta.gid)),
        )
        .map_err(std::io::Error::from)?;
        Ok(())
    })
    .await
    .map_err(|error| Error::Internal(anyhow::anyhow!("worker failed: {error}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;
    use lxr::models::ContainerKind;
    use std::collections::BTreeMap;

    fn seed(ctx: &Arc<ServerContext>, name: &str) {
        ctx.db
            .create_container(name, ContainerKind::Regular, "x86_64", &BTreeMap::new())
            .unwrap();
        std::fs::create_dir_all(ctx.config.container_dir(name).join("rootfs")).unwrap();
    }

    #[tokio::test]
    async fn test_round_trip_preserves_bytes_and_meta() {
        let (ctx, _dir, _driver) = test_context();
        seed(&ctx, "a");
        store(
            ctx.clone(),
            "a",
            "/etc/motd",
            FileMeta {
                uid: nix::unistd::getuid().as_raw(),
                gid: nix::unistd::getgid().as_raw(),
                mode: 0o640,
            },
            b"welcome\n",
        )
        .await
        .unwrap();

        let content = fetch(ctx.clone(), "a", "/etc/motd").await.unwrap();
        assert_eq!(content.body, b"welcome\n");
        assert_eq!(content.mode, "0640");
        assert_eq!(content.uid, nix::unistd::getuid().as_raw());
    }

    #[tokio::test]
    async fn test_escaping_path_rejected_before_io() {
        let (ctx, _dir, _driver) = test_context();
        seed(&ctx, "a");
        for path in ["/../../etc/passwd", "/a/../../../x", ".."] {
            let result = fetch(ctx.clone(), "a", path).await;
            assert!(matches!(result, Err(Error::BadRequest(_))), "{path}");
        }
    }

    #[tokio::test]
    async fn test_dotdot_inside_rootfs_is_fine() {
        let (ctx, _dir, _driver) = test_context();
        seed(&ctx, "a");
        store(ctx.clone(), "a", "/etc/hosts", FileMeta::default(), b"x")
            .await
            .unwrap();
        let content = fetch(ctx.clone(), "a", "/etc/../etc/hosts").await.unwrap();
        assert_eq!(content.body, b"x");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let (ctx, _dir, _driver) = test_context();
        seed(&ctx, "a");
        let result = fetch(ctx.clone(), "a", "/nope").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_container() {
        let (ctx, _dir, _driver) = test_context();
        let result = fetch(ctx.clone(), "ghost", "/etc/hosts").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("0644").unwrap(), 0o644);
        assert_eq!(parse_mode("755").unwrap(), 0o755);
        assert!(parse_mode("rwx").is_err());
    }
}
