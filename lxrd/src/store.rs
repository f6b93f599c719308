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
use crate::database::Database;
use lxr::models::config::{ConfigEntry, ConfigError};
use lxr::models::device::{device_type, Device, DeviceError};
use lxr::models::ContainerKind;
use rusqlite::{OptionalExtension, Transaction};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no such record")]
    NotFound,
    #[error("already defined")]
    AlreadyDefined,
    #[error("no such profile {0}")]
    NoSuchProfile(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[derive(Copy, Clone, Debug)]
pub enum DeviceOwner {
    Container,
    Profile,
}

impl DeviceOwner {
    fn tables(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            DeviceOwner::Container => (
                "containers_devices",
                "containers_devices_config",
                "container_id",
            ),
            DeviceOwner::Profile => ("profiles_devices", "profiles_devices_config", "profile_id"),
        }
    }
}

/// Delete a container's config rows, profile bindings, device config rows
/// and device rows, in that order, inside the caller's transaction.
pub fn clear_container_config(tx: &Transaction, container_id: i64) -> Result<(), StoreError> {
    tx.execute(
        "delete from containers_config where container_id=?",
        [container_id],
    )?;
    tx.execute(
        "delete from containers_profiles where container_id=?",
        [container_id],
    )?;
    tx.execute(
        "
        delete from containers_devices_config where container_device_id in
            (select id from containers_devices where container_id=?)
        ",
        [container_id],
    )?;
    tx.execute(
        "delete from containers_devices where container_id=?",
        [container_id],
    )?;
    Ok(())
}

/// Validate every key against the whitelist, then insert. A single bad key
/// fails the whole batch before anything is written.
pub fn insert_container_config(
    tx: &Transaction,
    container_id: i64,
    config: &BTreeMap<String, String>,
) -> Result<(), StoreError> {
    for (key, value) in config.iter() {
        ConfigEntry::parse(key, value)?;
    }
    let mut stmt = tx.prepare_cached(
        "insert into containers_config (container_id, key, value) values (?, ?, ?)",
    )?;
    for (key, value) in config.iter() {
        stmt.execute((container_id, key, value))?;
    }
    Ok(())
}

/// Rebind profiles. An empty list, or the single empty string the JSON
/// decoder produces for `profiles: [""]`, leaves the container unbound;
/// otherwise bindings are written with `apply_order` counting up from 1.
pub fn bind_profiles(
    tx: &Transaction,
    container_id: i64,
    profiles: &[String],
) -> Result<(), StoreError> {
    tx.execute(
        "delete from containers_profiles where container_id=?",
        [container_id],
    )?;
    if profiles.is_empty() || (profiles.len() == 1 && profiles[0].is_empty()) {
        return Ok(());
    }
    let mut lookup = tx.prepare_cached("select id from profiles where name=?")?;
    let mut insert = tx.prepare_cached(
        "insert into containers_profiles (container_id, profile_id, apply_order) values (?, ?, ?)",
    )?;
    for (index, name) in profiles.iter().enumerate() {
        let profile_id: i64 = lookup
            .query_row([name], |row| row.get(0))
            .optional()?
            .ok_or_else(|| StoreError::NoSuchProfile(name.to_string()))?;
        insert.execute((container_id, profile_id, index as i64 + 1))?;
    }
    Ok(())
}

pub fn insert_devices(
    tx: &Transaction,
    owner: DeviceOwner,
    owner_id: i64,
    devices: &HashMap<String, Device>,
) -> Result<(), StoreError> {
    let (device_table, config_table, owner_column) = owner.tables();
    for (name, device) in devices.iter() {
        let kind = device_type(name, device)?;
        tx.execute(
            &format!("insert into {device_table} ({owner_column}, name, type) values (?, ?, ?)"),
            (owner_id, name, kind),
        )?;
        let device_id = tx.last_insert_rowid();
        let mut stmt = tx.prepare_cached(&format!(
            "insert into {config_table} ({device_table}_id, key, value) values (?, ?, ?)"
        ))?;
        for (key, value) in device.iter() {
            if key == "type" {
                continue;
            }
            stmt.execute((device_id, key, value))?;
        }
    }
    Ok(())
}

impl Database {
    pub fn container_id_by_name(&self, name: &str) -> Result<i64, StoreError> {
        self.perform(|conn| {
            let mut stmt = conn.prepare_cached("select id from containers where name=?")?;
            stmt.query_row([name], |row| row.get(0))
                .optional()?
                .ok_or(StoreError::NotFound)
        })
    }

    /// id and architecture tag in one round trip, what materialization asks
    /// for first.
    pub fn container_meta(&self, name: &str) -> Result<(i64, String), StoreError> {
        self.perform(|conn| {
            let mut stmt =
                conn.prepare_cached("select id, architecture from containers where name=?")?;
            stmt.query_row([name], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?
                .ok_or(StoreError::NotFound)
        })
    }

    pub fn list_container_names(&self) -> Result<Vec<String>, StoreError> {
        self.perform(|conn| {
            let mut stmt = conn
                .prepare_cached("select name from containers where type=0 order by name")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<String>, _>>()?)
        })
    }

    pub fn image_id_by_alias(&self, alias: &str) -> Result<i64, StoreError> {
        self.perform(|conn| {
            let mut stmt =
                conn.prepare_cached("select image_id from images_aliases where name=?")?;
            stmt.query_row([alias], |row| row.get(0))
                .optional()?
                .ok_or(StoreError::NotFound)
        })
    }

    /// The alias row can outlive the image row; a missing fingerprint here is
    /// the stale-alias case.
    pub fn image_fingerprint_by_id(&self, image_id: i64) -> Result<String, StoreError> {
        self.perform(|conn| {
            let mut stmt = conn.prepare_cached("select fingerprint from images where id=?")?;
            stmt.query_row([image_id], |row| row.get(0))
                .optional()?
                .ok_or(StoreError::NotFound)
        })
    }

    pub fn image_fingerprint_exists(&self, fingerprint: &str) -> Result<bool, StoreError> {
        self.perform(|conn| {
            let count: i64 = conn.query_row(
                "select count(*) from images where fingerprint=?",
                [fingerprint],
                |row| row.get(0),
            )?;
            Ok(count != 0)
        })
    }

    /// Insert the container row and its config in one transaction. A name
    /// collision surfaces as `AlreadyDefined`, a whitelist violation aborts
    /// the transaction.
    pub fn create_container(
        &self,
        name: &str,
        kind: ContainerKind,
        architecture: &str,
        config: &BTreeMap<String, String>,
    ) -> Result<i64, StoreError> {
        self.perform(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "insert into containers (name, architecture, type) values (?, ?, ?)",
                (name, architecture, kind.as_db_value()),
            );
            if let Err(error) = inserted {
                if is_unique_violation(&error) {
                    return Err(StoreError::AlreadyDefined);
                }
                return Err(error.into());
            }
            let id = tx.last_insert_rowid();
            insert_container_config(&tx, id, config)?;
            tx.commit()?;
            Ok(id)
        })
    }

    pub fn delete_container(&self, container_id: i64) -> Result<(), StoreError> {
        self.perform(|conn| {
            let tx = conn.transaction()?;
            clear_container_config(&tx, container_id)?;
            tx.execute("delete from containers where id=?", [container_id])?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn rename_container(&self, container_id: i64, new_name: &str) -> Result<(), StoreError> {
        self.perform(|conn| {
            let renamed = conn.execute(
                "update containers set name=? where id=?",
                (new_name, container_id),
            );
            match renamed {
                Err(error) if is_unique_violation(&error) => Err(StoreError::AlreadyDefined),
                Err(error) => Err(error.into()),
                Ok(0) => Err(StoreError::NotFound),
                Ok(_) => Ok(()),
            }
        })
    }

    /// The whole-container replace used by PUT: clear, re-insert config,
    /// rebind profiles, re-insert devices, atomically.
    pub fn replace_container_config(
        &self,
        container_id: i64,
        config: &BTreeMap<String, String>,
        profiles: &[String],
        devices: &HashMap<String, Device>,
    ) -> Result<(), StoreError> {
        self.perform(|conn| {
            let tx = conn.transaction()?;
            clear_container_config(&tx, container_id)?;
            insert_container_config(&tx, container_id, config)?;
            bind_profiles(&tx, container_id, profiles)?;
            insert_devices(&tx, DeviceOwner::Container, container_id, devices)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Snapshots of `name`, as `(leaf, id)` pairs.
    pub fn list_snapshots_of(&self, name: &str) -> Result<Vec<(String, i64)>, StoreError> {
        let prefix = format!("{name}/");
        self.perform(|conn| {
            let mut stmt = conn.prepare_cached(
                "select name, id from containers where type=1 and name like ? order by name",
            )?;
            let rows = stmt.query_map([format!("{prefix}%")], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut snapshots = Vec::new();
            for row in rows {
                let (full_name, id) = row?;
                if let Some(leaf) = full_name.strip_prefix(&prefix) {
                    snapshots.push((leaf.to_string(), id));
                }
            }
            Ok(snapshots)
        })
    }

    /// Scan `<name>/snap<n>` rows and return max(n)+1, or 0 when no
    /// generated name exists yet.
    pub fn next_snapshot_index(&self, name: &str) -> Result<i64, StoreError> {
        let snapshots = self.list_snapshots_of(name)?;
        let mut next = 0;
        for (leaf, _) in snapshots {
            if let Some(n) = leaf.strip_prefix("snap").and_then(|s| s.parse::<i64>().ok()) {
                next = next.max(n + 1);
            }
        }
        Ok(next)
    }

    pub fn load_config(&self, container_id: i64) -> Result<BTreeMap<String, String>, StoreError> {
        self.perform(|conn| {
            let mut stmt = conn
                .prepare_cached("select key, value from containers_config where container_id=?")?;
            let rows = stmt.query_map([container_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut config = BTreeMap::new();
            for row in rows {
                let (key, value) = row?;
                config.insert(key, value);
            }
            Ok(config)
        })
    }

    pub fn load_profiles(&self, container_id: i64) -> Result<Vec<String>, StoreError> {
        self.perform(|conn| {
            let mut stmt = conn.prepare_cached(
                "
                select profiles.name
                from containers_profiles
                inner join profiles on profiles.id = containers_profiles.profile_id
                where containers_profiles.container_id=?
                order by containers_profiles.apply_order
                ",
            )?;
            let rows = stmt.query_map([container_id], |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<String>, _>>()?)
        })
    }

    pub fn load_profile_config(&self, name: &str) -> Result<BTreeMap<String, String>, StoreError> {
        self.perform(|conn| {
            let mut stmt = conn.prepare_cached(
                "
                select profiles_config.key, profiles_config.value
                from profiles_config
                inner join profiles on profiles.id = profiles_config.profile_id
                where profiles.name=?
                ",
            )?;
            let rows = stmt.query_map([name], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut config = BTreeMap::new();
            for row in rows {
                let (key, value) = row?;
                config.insert(key, value);
            }
            Ok(config)
        })
    }

    /// Devices of a container or profile, by owner name. The `type`
    /// attribute is folded back into each device's map.
    pub fn load_devices(
        &self,
        name: &str,
        is_profile: bool,
    ) -> Result<HashMap<String, Device>, StoreError> {
        let (sql, config_sql) = if is_profile {
            (
                "
                select profiles_devices.id, profiles_devices.name, profiles_devices.type
                from profiles_devices
                inner join profiles on profiles.id = profiles_devices.profile_id
                where profiles.name=?
                ",
                "select key, value from profiles_devices_config where profile_device_id=?",
            )
        } else {
            (
                "
                select containers_devices.id, containers_devices.name, containers_devices.type
                from containers_devices
                inner join containers on containers.id = containers_devices.container_id
                where containers.name=?
                ",
                "select key, value from containers_devices_config where container_device_id=?",
            )
        };
        self.perform(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt.query_map([name], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            let mut devices = HashMap::new();
            let mut config_stmt = conn.prepare_cached(config_sql)?;
            for row in rows {
                let (device_id, device_name, kind) = row?;
                let mut attrs: Device = HashMap::new();
                attrs.insert("type".to_string(), kind);
                let config_rows = config_stmt.query_map([device_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                for config_row in config_rows {
                    let (key, value) = config_row?;
                    attrs.insert(key, value);
                }
                devices.insert(device_name, attrs);
            }
            Ok(devices)
        })
    }

    /// The small slice of profile management the daemon itself needs; full
    /// profile CRUD lives on its own endpoint family.
    pub fn create_profile(
        &self,
        name: &str,
        config: &BTreeMap<String, String>,
        devices: &HashMap<String, Device>,
    ) -> Result<i64, StoreError> {
        self.perform(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute("insert into profiles (name) values (?)", [name]);
            if let Err(error) = inserted {
                if is_unique_violation(&error) {
                    return Err(StoreError::AlreadyDefined);
                }
                return Err(error.into());
            }
            let id = tx.last_insert_rowid();
            for (key, value) in config.iter() {
                ConfigEntry::parse(key, value)?;
                tx.execute(
                    "insert into profiles_config (profile_id, key, value) values (?, ?, ?)",
                    (id, key, value),
                )?;
            }
            insert_devices(&tx, DeviceOwner::Profile, id, devices)?;
            tx.commit()?;
            Ok(id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use lxr::models::ContainerKind;
    use std::collections::{BTreeMap, HashMap};

    fn open_store() -> Database {
        let db = Database::from(rusqlite::Connection::open_in_memory().unwrap());
        db.create_tables().expect("cannot create tables");
        db
    }

    fn config(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn nic(parent: &str) -> Device {
        HashMap::from([
            ("type".to_string(), "nic".to_string()),
            ("parent".to_string(), parent.to_string()),
        ])
    }

    #[test]
    fn test_create_and_lookup() {
        let db = open_store();
        let id = db
            .create_container(
                "a",
                ContainerKind::Regular,
                "x86_64",
                &config(&[("user.x", "1")]),
            )
            .unwrap();
        assert_eq!(db.container_id_by_name("a").unwrap(), id);
        assert_eq!(db.load_config(id).unwrap(), config(&[("user.x", "1")]));
        assert!(matches!(
            db.container_id_by_name("b"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_duplicate_name_is_distinguishable() {
        let db = open_store();
        db.create_container("a", ContainerKind::Regular, "x86_64", &BTreeMap::new())
            .unwrap();
        assert!(matches!(
            db.create_container("a", ContainerKind::Regular, "x86_64", &BTreeMap::new()),
            Err(StoreError::AlreadyDefined)
        ));
    }

    #[test]
    fn test_bad_key_aborts_creation() {
        let db = open_store();
        let result = db.create_container(
            "a",
            ContainerKind::Regular,
            "x86_64",
            &config(&[("boot.autostart", "1")]),
        );
        assert!(matches!(result, Err(StoreError::Config(_))));
        // the transaction rolled back, the name is free
        assert!(db
            .create_container("a", ContainerKind::Regular, "x86_64", &BTreeMap::new())
            .is_ok());
    }

    #[test]
    fn test_profile_binding_order() {
        let db = open_store();
        db.create_profile("default", &BTreeMap::new(), &HashMap::new())
            .unwrap();
        db.create_profile("web", &BTreeMap::new(), &HashMap::new())
            .unwrap();
        let id = db
            .create_container("a", ContainerKind::Regular, "x86_64", &BTreeMap::new())
            .unwrap();
        db.replace_container_config(
            id,
            &BTreeMap::new(),
            &["web".to_string(), "default".to_string()],
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(db.load_profiles(id).unwrap(), vec!["web", "default"]);

        // apply_order is a contiguous 1..N
        let orders: Vec<i64> = db.perform(|conn| {
            let mut stmt = conn
                .prepare("select apply_order from containers_profiles order by apply_order")
                .unwrap();
            let rows = stmt.query_map([], |row| row.get(0)).unwrap();
            rows.map(|r| r.unwrap()).collect()
        });
        assert_eq!(orders, vec![1, 2]);
    }

    #[test]
    fn test_empty_profile_list_clears() {
        let db = open_store();
        db.create_profile("default", &BTreeMap::new(), &HashMap::new())
            .unwrap();
        let id = db
            .create_container("a", ContainerKind::Regular, "x86_64", &BTreeMap::new())
            .unwrap();
        db.replace_container_config(
            id,
            &BTreeMap::new(),
            &["default".to_string()],
            &HashMap::new(),
        )
        .unwrap();
        db.replace_container_config(id, &BTreeMap::new(), &[String::new()], &HashMap::new())
            .unwrap();
        assert!(db.load_profiles(id).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_profile_rejected() {
        let db = open_store();
        let id = db
            .create_container("a", ContainerKind::Regular, "x86_64", &BTreeMap::new())
            .unwrap();
        let result = db.replace_container_config(
            id,
            &BTreeMap::new(),
            &["missing".to_string()],
            &HashMap::new(),
        );
        assert!(matches!(result, Err(StoreError::NoSuchProfile(_))));
    }

    #[test]
    fn test_replace_swaps_config() {
        let db = open_store();
        let id = db
            .create_container(
                "a",
                ContainerKind::Regular,
                "x86_64",
                &config(&[("limits.cpus", "2")]),
            )
            .unwrap();
        db.replace_container_config(
            id,
            &config(&[("limits.memory", "512M")]),
            &[],
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(
            db.load_config(id).unwrap(),
            config(&[("limits.memory", "512M")])
        );
    }

    #[test]
    fn test_devices_round_trip() {
        let db = open_store();
        let id = db
            .create_container("a", ContainerKind::Regular, "x86_64", &BTreeMap::new())
            .unwrap();
        let devices = HashMap::from([("eth0".to_string(), nic("br0"))]);
        db.replace_container_config(id, &BTreeMap::new(), &[], &devices)
            .unwrap();
        let loaded = db.load_devices("a", false).unwrap();
        assert_eq!(loaded["eth0"]["type"], "nic");
        assert_eq!(loaded["eth0"]["parent"], "br0");
    }

    #[test]
    fn test_snapshot_enumeration() {
        let db = open_store();
        db.create_container("c", ContainerKind::Regular, "x86_64", &BTreeMap::new())
            .unwrap();
        assert_eq!(db.next_snapshot_index("c").unwrap(), 0);
        for leaf in ["snap0", "snap3", "backup"] {
            db.create_container(
                &format!("c/{leaf}"),
                ContainerKind::Snapshot,
                "x86_64",
                &BTreeMap::new(),
            )
            .unwrap();
        }
        // unrelated container with a confusable prefix
        db.create_container("c2/snap9", ContainerKind::Snapshot, "x86_64", &BTreeMap::new())
            .unwrap();
        let leaves: Vec<String> = db
            .list_snapshots_of("c")
            .unwrap()
            .into_iter()
            .map(|(leaf, _)| leaf)
            .collect();
        assert_eq!(leaves, vec!["backup", "snap0", "snap3"]);
        assert_eq!(db.next_snapshot_index("c").unwrap(), 4);
    }

    #[test]
    fn test_delete_clears_everything() {
        let db = open_store();
        db.create_profile("default", &BTreeMap::new(), &HashMap::new())
            .unwrap();
        let id = db
            .create_container(
                "a",
                ContainerKind::Regular,
                "x86_64",
                &config(&[("user.x", "1")]),
            )
            .unwrap();
        let devices = HashMap::from([("eth0".to_string(), nic("br0"))]);
        db.replace_container_config(
            id,
            &config(&[("user.x", "1")]),
            &["default".to_string()],
            &devices,
        )
        .unwrap();
        db.delete_container(id).unwrap();
        assert!(matches!(
            db.container_id_by_name("a"),
            Err(StoreError::NotFound)
        ));
        let leftovers: i64 = db.perform(|conn| {
            conn.query_row(
                "
                select (select count(*) from containers_config)
                     + (select count(*) from containers_profiles)
                     + (select count(*) from containers_devices)
                     + (select count(*) from containers_devices_config)
                ",
                [],
                |row| row.get(0),
            )
            .unwrap()
        });
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_image_alias_resolution() {
        let db = open_store();
        db.execute("insert into images (fingerprint) values ('abc')", [])
            .unwrap();
        let image_id: i64 = db
            .query_row("select id from images where fingerprint='abc'", [], |row| {
                row.get(0)
            })
            .unwrap();
        db.execute(
            "insert into images_aliases (name, image_id) values ('ubuntu', ?)",
            [image_id],
        )
        .unwrap();
        assert_eq!(db.image_id_by_alias("ubuntu").unwrap(), image_id);
        assert_eq!(db.image_fingerprint_by_id(image_id).unwrap(), "abc");
        assert!(db.image_fingerprint_exists("abc").unwrap());
        assert!(!db.image_fingerprint_exists("zzz").unwrap());
        // stale alias: image row removed underneath the alias
        db.execute("delete from images where id=?", [image_id]).unwrap();
        assert!(matches!(
            db.image_fingerprint_by_id(image_id),
            Err(StoreError::NotFound)
        ));
    }
}
