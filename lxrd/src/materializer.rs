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
use lxr::models::config::{is_privileged, parse_raw_lines, ConfigEntry};
use lxr::models::device::to_runtime_items;
use lxr::models::runtime_arch;
use lxr::runtime::Handle;
use std::collections::BTreeMap;
use tracing::debug;

const COMMON_CONF: &str = "/usr/share/lxc/config/common.conf";
const USERNS_CONF: &str = "/usr/share/lxc/config/userns.conf";

/// Build a configured runtime handle from the stored record. The sequence
/// matters: base items, stamped paths, profiles in bound order, devices,
/// id maps, and the container's own config last so it shadows everything.
pub fn materialize(ctx: &ServerContext, name: &str) -> Result<Handle, Error> {
    let (id, arch_tag) = ctx.db.container_meta(name)?;

    let mut handle = Handle::new(ctx.driver.clone(), ctx.config.lxc_path(), name);
    handle.set_config_item("lxc.arch", runtime_arch(&arch_tag));
    handle.set_config_item("lxc.include", COMMON_CONF);
    handle.set_config_item("lxc.include", USERNS_CONF);

    let config = ctx.db.load_config(id)?;
    let profiles = ctx.db.load_profiles(id)?;
    handle.clear_devices();

    let rootfs = handle.rootfs_path();
    let logfile = handle.log_path();
    handle.set_config_item("lxc.rootfs", &rootfs.to_string_lossy());
    handle.set_config_item("lxc.loglevel", "0");
    handle.set_config_item("lxc.logfile", &logfile.to_string_lossy());
    handle.set_config_item("lxc.utsname", name);

    for profile in profiles.iter() {
        debug!("applying profile {profile} to {name}");
        let profile_config = ctx.db.load_profile_config(profile)?;
        let profile_devices = ctx.db.load_devices(profile, true)?;
        handle.layer_devices(profile_devices);
        apply_config(&mut handle, &profile_config)?;
    }

    let own_devices = ctx.db.load_devices(name, false)?;
    handle.layer_devices(own_devices);
    apply_devices(&mut handle)?;

    if !is_privileged(&config) {
        let base = ctx.config.idmap_base;
        let range = ctx.config.idmap_range;
        handle.set_config_item("lxc.id_map", &format!("u 0 {base} {range}"));
        handle.set_config_item("lxc.id_map", &format!("g 0 {base} {range}"));
    }

    apply_config(&mut handle, &config)?;
    Ok(handle)
}

/// Turn recognized config entries into runtime items. `user.*` is metadata,
/// `security.privileged` and `raw.apparmor` are consulted elsewhere.
pub fn apply_config(
    handle: &mut Handle,
    config: &BTreeMap<String, String>,
) -> Result<(), Error> {
    for (key, value) in config.iter() {
        match ConfigEntry::parse(key, value)? {
            ConfigEntry::LimitsCpus(count) => {
                let upper = count.max(1) - 1;
                handle.set_config_item("lxc.cgroup.cpuset.cpus", &format!("0-{upper}"));
            }
            ConfigEntry::LimitsMemory(limit) => {
                handle.set_config_item("lxc.cgroup.memory.limit_in_bytes", &limit);
            }
            ConfigEntry::RawLxc(raw) => {
                for (raw_key, raw_value) in parse_raw_lines(&raw)? {
                    handle.set_config_item(&raw_key, &raw_value);
                }
            }
            ConfigEntry::SecurityPrivileged(_)
            | ConfigEntry::RawApparmor(_)
            | ConfigEntry::User(_, _) => {}
        }
    }
    Ok(())
}

/// Translate every layered device and apply the resulting items. Any
/// translation or application problem aborts materialization.
fn apply_devices(handle: &mut Handle) -> Result<(), Error> {
    let mut devices: Vec<_> = handle
        .devices()
        .iter()
        .map(|(name, device)| (name.clone(), device.clone()))
        .collect();
    devices.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, device) in devices {
        if name == "type" {
            continue;
        }
        for (key, value) in to_runtime_items(&name, &device)? {
            handle.set_config_item(&key, &value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_context;
    use lxr::models::ContainerKind;
    use std::collections::{BTreeMap, HashMap};

    fn config(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn items_of(handle: &lxr::runtime::Handle, key: &str) -> Vec<String> {
        handle
            .config_items()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    #[test]
    fn test_base_items_come_first() {
        let (ctx, _dir, _driver) = test_context();
        ctx.db
            .create_container("a", ContainerKind::Regular, "x86_64", &BTreeMap::new())
            .unwrap();
        let handle = ctx.handle_for("a").unwrap();
        let items = handle.config_items();
        assert_eq!(items[0], ("lxc.arch".to_string(), "x86_64".to_string()));
        assert!(items[1].0 == "lxc.include" && items[2].0 == "lxc.include");
        assert_eq!(items_of(&handle, "lxc.utsname"), vec!["a"]);
        assert_eq!(items_of(&handle, "lxc.loglevel"), vec!["0"]);
    }

    #[test]
    fn test_cpus_and_memory() {
        let (ctx, _dir, _driver) = test_context();
        ctx.db
            .create_container(
                "a",
                ContainerKind::Regular,
                "x86_64",
                &config(&[("limits.cpus", "2"), ("limits.memory", "512M")]),
            )
            .unwrap();
        let handle = ctx.handle_for("a").unwrap();
        assert_eq!(items_of(&handle, "lxc.cgroup.cpuset.cpus"), vec!["0-1"]);
        assert_eq!(
            items_of(&handle, "lxc.cgroup.memory.limit_in_bytes"),
            vec!["512M"]
        );
    }

    #[test]
    fn test_unprivileged_gets_id_map() {
        let (ctx, _dir, _driver) = test_context();
        ctx.db
            .create_container("a", ContainerKind::Regular, "x86_64", &BTreeMap::new())
            .unwrap();
        let handle = ctx.handle_for("a").unwrap();
        assert_eq!(
            items_of(&handle, "lxc.id_map"),
            vec!["u 0 100000 65536", "g 0 100000 65536"]
        );
    }

    #[test]
    fn test_privileged_skips_id_map() {
        let (ctx, _dir, _driver) = test_context();
        ctx.db
            .create_container(
                "a",
                ContainerKind::Regular,
                "x86_64",
                &config(&[("security.privileged", "1")]),
            )
            .unwrap();
        let handle = ctx.handle_for("a").unwrap();
        assert!(items_of(&handle, "lxc.id_map").is_empty());
    }

    #[test]
    fn test_profile_layering() {
        let (ctx, _dir, _driver) = test_context();
        let profile_devices = HashMap::from([(
            "eth0".to_string(),
            HashMap::from([
                ("type".to_string(), "nic".to_string()),
                ("parent".to_string(), "br-profile".to_string()),
            ]),
        )]);
        ctx.db
            .create_profile(
                "default",
                &config(&[("limits.memory", "256M")]),
                &profile_devices,
            )
            .unwrap();
        let id = ctx
            .db
            .create_container("a", ContainerKind::Regular, "x86_64", &BTreeMap::new())
            .unwrap();
        // container's own device shadows the profile's by name
        let own_devices = HashMap::from([(
            "eth0".to_string(),
            HashMap::from([
                ("type".to_string(), "nic".to_string()),
                ("parent".to_string(), "br-own".to_string()),
            ]),
        )]);
        ctx.db
            .replace_container_config(
                id,
                &BTreeMap::new(),
                &["default".to_string()],
                &own_devices,
            )
            .unwrap();

        let handle = ctx.handle_for("a").unwrap();
        assert_eq!(
            items_of(&handle, "lxc.cgroup.memory.limit_in_bytes"),
            vec!["256M"]
        );
        assert_eq!(items_of(&handle, "lxc.network.link"), vec!["br-own"]);
    }

    #[test]
    fn test_raw_lxc_passthrough() {
        let (ctx, _dir, _driver) = test_context();
        ctx.db
            .create_container(
                "a",
                ContainerKind::Regular,
                "x86_64",
                &config(&[("raw.lxc", "lxc.aa_profile = unconfined\nlxc.cap.drop=mac_admin")]),
            )
            .unwrap();
        let handle = ctx.handle_for("a").unwrap();
        assert_eq!(items_of(&handle, "lxc.aa_profile"), vec!["unconfined"]);
        assert_eq!(items_of(&handle, "lxc.cap.drop"), vec!["mac_admin"]);
    }

    #[test]
    fn test_unknown_container() {
        let (ctx, _dir, _driver) = test_context();
        assert!(ctx.handle_for("ghost").is_err());
    }
}
