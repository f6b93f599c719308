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
use crate::context::ServerContext;
use crate::database::Database;
use lxr::models::exec::AttachSpec;
use lxr::runtime::{Driver, Handle, RuntimeError};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

/// Driver double that records every primitive invoked against it. `running`
/// and `attach_status` are adjustable per test.
#[derive(Default)]
pub struct RecordingDriver {
    pub calls: Mutex<Vec<String>>,
    pub running: AtomicBool,
    pub attach_status: AtomicI32,
}

impl RecordingDriver {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }
}

impl Driver for RecordingDriver {
    fn start(&self, handle: &Handle) -> Result<(), RuntimeError> {
        self.record(format!("start {}", handle.name()));
        self.set_running(true);
        Ok(())
    }

    fn stop(&self, handle: &Handle, timeout: i64, force: bool) -> Result<(), RuntimeError> {
        self.record(format!("stop {} timeout={timeout} force={force}", handle.name()));
        self.set_running(false);
        Ok(())
    }

    fn reboot(&self, handle: &Handle) -> Result<(), RuntimeError> {
        self.record(format!("reboot {}", handle.name()));
        Ok(())
    }

    fn freeze(&self, handle: &Handle) -> Result<(), RuntimeError> {
        self.record(format!("freeze {}", handle.name()));
        Ok(())
    }

    fn unfreeze(&self, handle: &Handle) -> Result<(), RuntimeError> {
        self.record(format!("unfreeze {}", handle.name()));
        Ok(())
    }

    fn rename(&self, handle: &Handle, new_name: &str) -> Result<(), RuntimeError> {
        self.record(format!("rename {} {new_name}", handle.name()));
        Ok(())
    }

    fn checkpoint(
        &self,
        handle: &Handle,
        state_dir: &Path,
        stop: bool,
        verbose: bool,
    ) -> Result<(), RuntimeError> {
        self.record(format!(
            "checkpoint {} {} stop={stop} verbose={verbose}",
            handle.name(),
            state_dir.display()
        ));
        Ok(())
    }

    fn attach(&self, handle: &Handle, spec: &AttachSpec) -> Result<i32, RuntimeError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(RuntimeError::NotRunning);
        }
        self.record(format!("attach {} {:?}", handle.name(), spec.command));
        Ok(self.attach_status.load(Ordering::SeqCst))
    }

    fn running(&self, _handle: &Handle) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn init_pid(&self, _handle: &Handle) -> Option<i32> {
        if self.running.load(Ordering::SeqCst) {
            Some(4242)
        } else {
            None
        }
    }
}

/// A server context over an in-memory store and a recording driver, rooted
/// in a scratch var directory.
pub fn test_context() -> (Arc<ServerContext>, tempfile::TempDir, Arc<RecordingDriver>) {
    let dir = tempfile::tempdir().expect("cannot create scratch dir");
    let config = LxrdConfig {
        var_dir: dir.path().to_path_buf(),
        database_store: dir.path().join("lxrd.sqlite"),
        tls_cert: dir.path().join("server.crt"),
        tls_key: dir.path().join("server.key"),
        ..LxrdConfig::default()
    };
    config.prepare().expect("cannot prepare var dir");
    let driver = Arc::new(RecordingDriver::default());
    let db = Database::from(rusqlite::Connection::open_in_memory().unwrap());
    let ctx = ServerContext::assemble(config, db, driver.clone()).expect("cannot assemble context");
    (ctx, dir, driver)
}
