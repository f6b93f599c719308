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
pub mod lxc;

use crate::models::device::Device;
use crate::models::exec::AttachSpec;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{command} exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("container is not running")]
    NotRunning,
}

/// The low-level container primitives. The production implementation shells
/// out to the lxc userland tools; tests substitute an in-process recorder.
pub trait Driver: Send + Sync {
    fn start(&self, handle: &Handle) -> Result<(), RuntimeError>;
    fn stop(&self, handle: &Handle, timeout: i64, force: bool) -> Result<(), RuntimeError>;
    fn reboot(&self, handle: &Handle) -> Result<(), RuntimeError>;
    fn freeze(&self, handle: &Handle) -> Result<(), RuntimeError>;
    fn unfreeze(&self, handle: &Handle) -> Result<(), RuntimeError>;
    fn rename(&self, handle: &Handle, new_name: &str) -> Result<(), RuntimeError>;
    fn checkpoint(
        &self,
        handle: &Handle,
        state_dir: &Path,
        stop: bool,
        verbose: bool,
    ) -> Result<(), RuntimeError>;
    /// Run a command inside the container and return its exit status.
    fn attach(&self, handle: &Handle, spec: &AttachSpec) -> Result<i32, RuntimeError>;
    fn running(&self, handle: &Handle) -> bool;
    fn init_pid(&self, handle: &Handle) -> Option<i32>;
}

/// A configured view of one container, materialized on demand from the
/// store and discarded when the request is done. The handle accumulates
/// runtime config items and a device map; nothing touches the system until
/// one of the lifecycle methods delegates to the driver.
pub struct Handle {
    name: String,
    runtime_path: PathBuf,
    items: Vec<(String, String)>,
    devices: HashMap<String, Device>,
    driver: Arc<dyn Driver>,
}

impl Handle {
    pub fn new(driver: Arc<dyn Driver>, runtime_path: impl AsRef<Path>, name: &str) -> Handle {
        Handle {
            name: name.to_string(),
            runtime_path: runtime_path.as_ref().to_path_buf(),
            items: Vec::new(),
            devices: HashMap::new(),
            driver,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runtime_path(&self) -> &Path {
        &self.runtime_path
    }

    pub fn container_dir(&self) -> PathBuf {
        self.runtime_path.join(&self.name)
    }

    pub fn rootfs_path(&self) -> PathBuf {
        self.container_dir().join("rootfs")
    }

    pub fn log_path(&self) -> PathBuf {
        self.container_dir().join("log")
    }

    pub fn config_path(&self) -> PathBuf {
        self.container_dir().join("config")
    }

    pub fn set_config_item(&mut self, key: &str, value: &str) {
        self.items.push((key.to_string(), value.to_string()));
    }

    pub fn config_items(&self) -> &[(String, String)] {
        &self.items
    }

    pub fn clear_devices(&mut self) {
        self.devices.clear();
    }

    /// Layer a device map into the handle; colliding names are overwritten,
    /// so later layers shadow earlier ones.
    pub fn layer_devices(&mut self, devices: HashMap<String, Device>) {
        for (name, device) in devices {
            self.devices.insert(name, device);
        }
    }

    pub fn devices(&self) -> &HashMap<String, Device> {
        &self.devices
    }

    /// Render the accumulated items in insertion order, the format the lxc
    /// tools read back.
    pub fn render_config(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.items.iter() {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    pub fn start(&self) -> Result<(), RuntimeError> {
        self.driver.start(self)
    }

    pub fn stop(&self, timeout: i64, force: bool) -> Result<(), RuntimeError> {
        self.driver.stop(self, timeout, force)
    }

    pub fn reboot(&self) -> Result<(), RuntimeError> {
        self.driver.reboot(self)
    }

    pub fn freeze(&self) -> Result<(), RuntimeError> {
        self.driver.freeze(self)
    }

    pub fn unfreeze(&self) -> Result<(), RuntimeError> {
        self.driver.unfreeze(self)
    }

    pub fn rename(&self, new_name: &str) -> Result<(), RuntimeError> {
        self.driver.rename(self, new_name)
    }

    pub fn checkpoint(
        &self,
        state_dir: &Path,
        stop: bool,
        verbose: bool,
    ) -> Result<(), RuntimeError> {
        self.driver.checkpoint(self, state_dir, stop, verbose)
    }

    pub fn attach(&self, spec: &AttachSpec) -> Result<i32, RuntimeError> {
        self.driver.attach(self, spec)
    }

    pub fn running(&self) -> bool {
        self.driver.running(self)
    }

    pub fn init_pid(&self) -> Option<i32> {
        self.driver.init_pid(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::exec::AttachSpec;
    use std::path::Path;

    struct NopDriver;

    impl Driver for NopDriver {
        fn start(&self, _: &Handle) -> Result<(), RuntimeError> {
            Ok(())
        }
        fn stop(&self, _: &Handle, _: i64, _: bool) -> Result<(), RuntimeError> {
            Ok(())
        }
        fn reboot(&self, _: &Handle) -> Result<(), RuntimeError> {
            Ok(())
        }
        fn freeze(&self, _: &Handle) -> Result<(), RuntimeError> {
            Ok(())
        }
        fn unfreeze(&self, _: &Handle) -> Result<(), RuntimeError> {
            Ok(())
        }
        fn rename(&self, _: &Handle, _: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
        fn checkpoint(&self, _: &Handle, _: &Path, _: bool, _: bool) -> Result<(), RuntimeError> {
            Ok(())
        }
        fn attach(&self, _: &Handle, _: &AttachSpec) -> Result<i32, RuntimeError> {
            Ok(0)
        }
        fn running(&self, _: &Handle) -> bool {
            false
        }
        fn init_pid(&self, _: &Handle) -> Option<i32> {
            None
        }
    }

    #[test]
    fn test_paths() {
        let handle = Handle::new(Arc::new(NopDriver), "/var/lib/lxr/lxc", "web");
        assert_eq!(
            handle.container_dir(),
            Path::new("/var/lib/lxr/lxc/web").to_path_buf()
        );
        assert_eq!(
            handle.rootfs_path(),
            Path::new("/var/lib/lxr/lxc/web/rootfs").to_path_buf()
        );
    }

    #[test]
    fn test_render_preserves_order() {
        let mut handle = Handle::new(Arc::new(NopDriver), "/tmp", "a");
        handle.set_config_item("lxc.arch", "x86_64");
        handle.set_config_item("lxc.utsname", "a");
        assert_eq!(handle.render_config(), "lxc.arch = x86_64\nlxc.utsname = a\n");
    }

    #[test]
    fn test_device_layering_last_write_wins() {
        let mut handle = Handle::new(Arc::new(NopDriver), "/tmp", "a");
        let mut first = HashMap::new();
        first.insert(
            "eth0".to_string(),
            HashMap::from([("type".to_string(), "nic".to_string())]),
        );
        let mut second = HashMap::new();
        second.insert(
            "eth0".to_string(),
            HashMap::from([("type".to_string(), "none".to_string())]),
        );
        handle.layer_devices(first);
        handle.layer_devices(second);
        assert_eq!(handle.devices()["eth0"]["type"], "none");
    }
}
