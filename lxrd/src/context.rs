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
use crate::database::Database;
use crate::errors::Error;
use crate::operation::Operations;
use lxr::runtime::lxc::LxcDriver;
use lxr::runtime::{Driver, Handle};
use std::sync::Arc;

pub struct ServerContext {
    pub config: LxrdConfig,
    pub db: Arc<Database>,
    pub operations: Operations,
    pub(crate) driver: Arc<dyn Driver>,
}

impl ServerContext {
    pub fn new(config: LxrdConfig) -> anyhow::Result<Arc<ServerContext>> {
        let conn = rusqlite::Connection::open(&config.database_store)?;
        ServerContext::assemble(config, Database::from(conn), Arc::new(LxcDriver))
    }

    pub fn assemble(
        config: LxrdConfig,
        db: Database,
        driver: Arc<dyn Driver>,
    ) -> anyhow::Result<Arc<ServerContext>> {
        db.create_tables()?;
        Ok(Arc::new(ServerContext {
            config,
            db: Arc::new(db),
            operations: Operations::new(),
            driver,
        }))
    }

    /// Materialize the named container into a configured runtime handle.
    pub fn handle_for(&self, name: &str) -> Result<Handle, Error> {
        crate::materializer::materialize(self, name)
    }

    /// A bare handle for a container that has a directory but whose stored
    /// config is not needed, e.g. right before its record exists.
    pub fn bare_handle(&self, name: &str) -> Handle {
        Handle::new(self.driver.clone(), self.config.lxc_path(), name)
    }
}
