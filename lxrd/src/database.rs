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
use rusqlite::{Connection, Params, Row};
use std::sync::Mutex;

pub struct Database {
    db: Mutex<Connection>,
}

impl From<Connection> for Database {
    fn from(db: Connection) -> Database {
        Database { db: Mutex::new(db) }
    }
}

impl Database {
    pub fn perform<F, T>(&self, func: F) -> T
    where
        F: FnOnce(&mut Connection) -> T,
    {
        let mut conn = self.db.lock().unwrap();
        func(&mut conn)
    }

    pub fn execute<P: Params>(&self, sql: &str, params: P) -> rusqlite::Result<usize> {
        self.perform(|conn| conn.execute(sql, params))
    }

    pub fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> rusqlite::Result<T>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.perform(|conn| conn.query_row(sql, params, f))
    }

    pub fn create_tables(&self) -> rusqlite::Result<()> {
        self.perform(|conn| {
            conn.execute_batch(
                "
                create table if not exists containers (
                    id integer primary key autoincrement,
                    name text not null unique,
                    architecture text not null default 'x86_64',
                    type integer not null default 0
                );

                create table if not exists containers_config (
                    container_id integer not null,
                    key text not null,
                    value text not null,
                    primary key (container_id, key),
                    foreign key (container_id)
                        references containers(id)
                        on delete cascade
                );

                create table if not exists profiles (
                    id integer primary key autoincrement,
                    name text not null unique
                );

                create table if not exists profiles_config (
                    profile_id integer not null,
                    key text not null,
                    value text not null,
                    primary key (profile_id, key),
                    foreign key (profile_id)
                        references profiles(id)
                        on delete cascade
                );

                create table if not exists containers_profiles (
                    container_id integer not null,
                    profile_id integer not null,
                    apply_order integer not null,
                    primary key (container_id, profile_id),
                    foreign key (container_id) references containers(id),
                    foreign key (profile_id) references profiles(id)
                );

                create table if not exists containers_devices (
                    id integer primary key autoincrement,
                    container_id integer not null,
                    name text not null,
                    type text not null,
                    unique (container_id, name),
                    foreign key (container_id) references containers(id)
                );

                create table if not exists containers_devices_config (
                    container_device_id integer not null,
                    key text not null,
                    value text not null,
                    primary key (container_device_id, key),
                    foreign key (container_device_id)
                        references containers_devices(id)
                );

                create table if not exists profiles_devices (
                    id integer primary key autoincrement,
                    profile_id integer not null,
                    name text not null,
                    type text not null,
                    unique (profile_id, name),
                    foreign key (profile_id) references profiles(id)
                );

                create table if not exists profiles_devices_config (
                    profile_device_id integer not null,
                    key text not null,
                    value text not null,
                    primary key (profile_device_id, key),
                    foreign key (profile_device_id)
                        references profiles_devices(id)
                );

                create table if not exists images (
                    id integer primary key autoincrement,
                    fingerprint text not null unique
                );

                create table if not exists images_aliases (
                    name text not null primary key,
                    image_id integer not null,
                    foreign key (image_id) references images(id)
                );
                ",
            )
        })
    }
}
