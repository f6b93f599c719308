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
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_listen() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_var_dir() -> PathBuf {
    PathBuf::from("/var/lib/lxrd")
}

fn default_database_store() -> PathBuf {
    PathBuf::from("/var/lib/lxrd/lxrd.sqlite")
}

fn default_tls_cert() -> PathBuf {
    PathBuf::from("/var/lib/lxrd/server.crt")
}

fn default_tls_key() -> PathBuf {
    PathBuf::from("/var/lib/lxrd/server.key")
}

fn default_idmap_base() -> u32 {
    100_000
}

fn default_idmap_range() -> u32 {
    65536
}

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct LxrdConfigArg {
    /// Address the JSON API listens on
    #[arg(long = "listen")]
    pub listen: Option<String>,

    /// Directory holding container trees and images
    #[arg(long = "var-dir")]
    pub var_dir: Option<PathBuf>,

    /// The sqlite database file
    #[arg(long = "database-store")]
    pub database_store: Option<PathBuf>,

    /// Server certificate presented to migration peers
    #[arg(long = "tls-cert")]
    pub tls_cert: Option<PathBuf>,

    /// Private key for the server certificate
    #[arg(long = "tls-key")]
    pub tls_key: Option<PathBuf>,

    /// First host uid/gid handed to unprivileged containers
    #[arg(long = "idmap-base")]
    pub idmap_base: Option<u32>,

    /// Number of ids mapped into each unprivileged container
    #[arg(long = "idmap-range")]
    pub idmap_range: Option<u32>,

    #[arg(default_value = "/etc/lxrd.conf")]
    pub config_path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LxrdConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_var_dir")]
    pub var_dir: PathBuf,

    #[serde(default = "default_database_store")]
    pub database_store: PathBuf,

    #[serde(default = "default_tls_cert")]
    pub tls_cert: PathBuf,

    #[serde(default = "default_tls_key")]
    pub tls_key: PathBuf,

    #[serde(default = "default_idmap_base")]
    pub idmap_base: u32,

    #[serde(default = "default_idmap_range")]
    pub idmap_range: u32,
}

impl Default for LxrdConfig {
    fn default() -> LxrdConfig {
        LxrdConfig {
            listen: default_listen(),
            var_dir: default_var_dir(),
            database_store: default_database_store(),
            tls_cert: default_tls_cert(),
            tls_key: default_tls_key(),
            idmap_base: default_idmap_base(),
            idmap_range: default_idmap_range(),
        }
    }
}

impl LxrdConfig {
    /// Where the runtime containers live; `<lxc_path>/<name>` is a container
    /// directory with `rootfs/`, `log` and the rendered runtime config.
    pub fn lxc_path(&self) -> PathBuf {
        self.var_dir.join("lxc")
    }

    pub fn images_path(&self) -> PathBuf {
        self.var_dir.join("images")
    }

    pub fn container_dir(&self, name: &str) -> PathBuf {
        self.lxc_path().join(name)
    }

    pub fn merge(&mut self, args: LxrdConfigArg) {
        macro_rules! merge_field {
            ($field:ident) => {
                if let Some(value) = args.$field {
                    self.$field = value;
                }
            };
        }
        merge_field!(listen);
        merge_field!(var_dir);
        merge_field!(database_store);
        merge_field!(tls_cert);
        merge_field!(tls_key);
        merge_field!(idmap_base);
        merge_field!(idmap_range);
    }

    pub fn prepare(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.var_dir)?;
        std::fs::create_dir_all(self.lxc_path())?;
        std::fs::create_dir_all(self.images_path())?;
        if let Some(parent) = self.database_store.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{LxrdConfig, LxrdConfigArg};
    use std::path::PathBuf;

    #[test]
    fn test_merge_overrides() {
        let mut config = LxrdConfig::default();
        let args = LxrdConfigArg {
            listen: Some("127.0.0.1:9999".to_string()),
            var_dir: Some(PathBuf::from("/tmp/lxrd")),
            database_store: None,
            tls_cert: None,
            tls_key: None,
            idmap_base: None,
            idmap_range: None,
            config_path: PathBuf::from("/etc/lxrd.conf"),
        };
        config.merge(args);
        assert_eq!(config.listen, "127.0.0.1:9999");
        assert_eq!(config.lxc_path(), PathBuf::from("/tmp/lxrd/lxc"));
        assert_eq!(config.database_store, PathBuf::from("/var/lib/lxrd/lxrd.sqlite"));
    }

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: LxrdConfig = serde_yaml::from_str("listen: 1.2.3.4:8443").unwrap();
        assert_eq!(config.listen, "1.2.3.4:8443");
        assert_eq!(config.idmap_base, 100_000);
    }
}
