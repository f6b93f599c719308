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
pub mod config;
pub mod device;
pub mod exec;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    Regular,
    Snapshot,
}

impl ContainerKind {
    pub fn as_db_value(&self) -> i64 {
        match self {
            ContainerKind::Regular => 0,
            ContainerKind::Snapshot => 1,
        }
    }

    pub fn from_db_value(value: i64) -> ContainerKind {
        if value == 1 {
            ContainerKind::Snapshot
        } else {
            ContainerKind::Regular
        }
    }
}

/// Snapshot names are `parent/leaf`; snapshots of snapshots do not exist, so
/// a valid name contains exactly one separator.
pub fn split_snapshot_name(name: &str) -> Option<(&str, &str)> {
    let (parent, leaf) = name.split_once('/')?;
    if parent.is_empty() || leaf.is_empty() || leaf.contains('/') {
        return None;
    }
    Some((parent, leaf))
}

pub fn is_snapshot_name(name: &str) -> bool {
    split_snapshot_name(name).is_some()
}

/// The image pipeline only produces amd64 trees today, every stored
/// architecture tag materializes to the same runtime architecture.
pub fn runtime_arch(_tag: &str) -> &'static str {
    "x86_64"
}

#[cfg(test)]
mod tests {
    use super::{split_snapshot_name, ContainerKind};

    #[test]
    fn test_snapshot_name_split() {
        assert_eq!(split_snapshot_name("web/snap0"), Some(("web", "snap0")));
        assert_eq!(split_snapshot_name("web"), None);
        assert_eq!(split_snapshot_name("web/a/b"), None);
        assert_eq!(split_snapshot_name("/leaf"), None);
        assert_eq!(split_snapshot_name("web/"), None);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [ContainerKind::Regular, ContainerKind::Snapshot] {
            assert_eq!(ContainerKind::from_db_value(kind.as_db_value()), kind);
        }
    }
}
