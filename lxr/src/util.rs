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
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Component, Path, PathBuf};

pub fn epoch_now() -> std::time::Duration {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
}

pub fn epoch_now_secs() -> u64 {
    epoch_now().as_secs()
}

pub fn gen_id() -> String {
    // I'm lazy
    let uuid = uuid::Uuid::new_v4().to_string();
    let (_, id) = uuid.rsplit_once('-').unwrap();
    id.to_string()
}

/// 32 alphanumeric characters, used as per-channel websocket secrets
pub fn gen_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Render a file mode the way stat(1) prints it, 4 octal digits
pub fn format_mode(mode: u32) -> String {
    format!("{:04o}", mode & 0o7777)
}

/// Join `path` onto `root` with purely lexical `..` resolution. The result is
/// guaranteed to stay under `root`; a path that would climb above it returns
/// None. Symlinks are not chased, the caller decides whether the final path
/// may be dereferenced.
pub fn confine_path(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Option<PathBuf> {
    let root = root.as_ref();
    let mut real = root.to_path_buf();
    let mut depth = 0usize;

    for comp in path.as_ref().components() {
        match comp {
            Component::Prefix(_) | Component::RootDir => {
                real = root.to_path_buf();
                depth = 0;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                real.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                real.push(part);
                depth += 1;
            }
        }
    }
    Some(real)
}

#[cfg(test)]
mod tests {
    use super::{confine_path, format_mode, gen_secret};
    use std::path::PathBuf;

    #[test]
    fn test_confine_plain() {
        let p = confine_path("/var/lib/lxr/lxc/a/rootfs", "/etc/hosts").unwrap();
        assert_eq!(p, PathBuf::from("/var/lib/lxr/lxc/a/rootfs/etc/hosts"));
    }

    #[test]
    fn test_confine_dotdot_inside() {
        let p = confine_path("/root", "/a/b/../c").unwrap();
        assert_eq!(p, PathBuf::from("/root/a/c"));
    }

    #[test]
    fn test_confine_escape() {
        assert!(confine_path("/root", "/..").is_none());
        assert!(confine_path("/root", "/a/../../etc/passwd").is_none());
        assert!(confine_path("/root", "..").is_none());
    }

    #[test]
    fn test_confine_relative() {
        let p = confine_path("/root", "a/./b").unwrap();
        assert_eq!(p, PathBuf::from("/root/a/b"));
    }

    #[test]
    fn test_format_mode() {
        assert_eq!(format_mode(0o100644), "0644");
        assert_eq!(format_mode(0o40755), "0755");
        assert_eq!(format_mode(0o4755), "4755");
    }

    #[test]
    fn test_secret_shape() {
        let s = gen_secret();
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(s, gen_secret());
    }
}
