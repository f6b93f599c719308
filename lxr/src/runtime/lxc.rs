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
use super::{Driver, Handle, RuntimeError};
use crate::models::exec::{AttachSpec, AttachStdio};
use std::os::fd::{FromRawFd, RawFd};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Driver backed by the lxc userland tools. Every operation renders the
/// handle's config items to `<runtime>/<name>/config` first so the tools and
/// the daemon agree on what the container looks like.
#[derive(Default)]
pub struct LxcDriver;

impl LxcDriver {
    fn command(&self, tool: &str, handle: &Handle) -> Command {
        let mut cmd = Command::new(tool);
        cmd.arg("-P")
            .arg(handle.runtime_path())
            .arg("-n")
            .arg(handle.name());
        cmd
    }

    fn run(&self, mut cmd: Command) -> Result<(), RuntimeError> {
        let rendered = format!("{cmd:?}");
        debug!("running {rendered}");
        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(RuntimeError::CommandFailed {
                command: rendered,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn write_config(&self, handle: &Handle) -> Result<(), RuntimeError> {
        std::fs::create_dir_all(handle.container_dir())?;
        std::fs::write(handle.config_path(), handle.render_config())?;
        Ok(())
    }
}

// lxc-attach keeps whatever fd it inherits, dup so the caller's copy stays
// usable after the child exits
fn stdio_from(fd: RawFd) -> Result<Stdio, RuntimeError> {
    let duped = nix::unistd::dup(fd).map_err(std::io::Error::from)?;
    Ok(unsafe { Stdio::from_raw_fd(duped) })
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

impl Driver for LxcDriver {
    fn start(&self, handle: &Handle) -> Result<(), RuntimeError> {
        self.write_config(handle)?;
        let mut cmd = self.command("lxc-start", handle);
        cmd.arg("-f").arg(handle.config_path()).arg("-d");
        self.run(cmd)
    }

    fn stop(&self, handle: &Handle, timeout: i64, force: bool) -> Result<(), RuntimeError> {
        let mut cmd = self.command("lxc-stop", handle);
        if force || timeout == 0 {
            cmd.arg("-k");
        } else if timeout > 0 {
            cmd.arg("-t").arg(timeout.to_string());
        }
        self.run(cmd)
    }

    fn reboot(&self, handle: &Handle) -> Result<(), RuntimeError> {
        let mut cmd = self.command("lxc-stop", handle);
        cmd.arg("-r");
        self.run(cmd)
    }

    fn freeze(&self, handle: &Handle) -> Result<(), RuntimeError> {
        self.run(self.command("lxc-freeze", handle))
    }

    fn unfreeze(&self, handle: &Handle) -> Result<(), RuntimeError> {
        self.run(self.command("lxc-unfreeze", handle))
    }

    fn rename(&self, handle: &Handle, new_name: &str) -> Result<(), RuntimeError> {
        let mut cmd = self.command("lxc-copy", handle);
        cmd.arg("-N").arg(new_name).arg("-R");
        self.run(cmd)
    }

    fn checkpoint(
        &self,
        handle: &Handle,
        state_dir: &Path,
        stop: bool,
        verbose: bool,
    ) -> Result<(), RuntimeError> {
        let mut cmd = self.command("lxc-checkpoint", handle);
        cmd.arg("-D").arg(state_dir);
        if stop {
            cmd.arg("-s");
        }
        if verbose {
            cmd.arg("-v");
        }
        self.run(cmd)
    }

    fn attach(&self, handle: &Handle, spec: &AttachSpec) -> Result<i32, RuntimeError> {
        if !self.running(handle) {
            return Err(RuntimeError::NotRunning);
        }

        let mut cmd = self.command("lxc-attach", handle);
        cmd.arg("--clear-env");
        for (key, value) in spec.envs.iter() {
            cmd.arg("-v").arg(format!("{key}={value}"));
        }
        cmd.arg("--");
        if let Some(dir) = &spec.work_dir {
            cmd.arg("sh")
                .arg("-c")
                .arg(format!("cd {} && exec \"$@\"", shell_quote(dir)))
                .arg("sh");
        }
        cmd.args(&spec.command);

        let (stdin, stdout, stderr) = match spec.stdio {
            AttachStdio::Terminal { tty } => (tty, tty, tty),
            AttachStdio::Forward {
                stdin,
                stdout,
                stderr,
            } => (stdin, stdout, stderr),
        };
        cmd.stdin(stdio_from(stdin)?);
        cmd.stdout(stdio_from(stdout)?);
        cmd.stderr(stdio_from(stderr)?);

        debug!("attaching {:?} in {}", spec.command, handle.name());
        let status = cmd.status()?;
        Ok(status
            .code()
            .unwrap_or_else(|| 128 + status.signal().unwrap_or(0)))
    }

    fn running(&self, handle: &Handle) -> bool {
        let mut cmd = self.command("lxc-info", handle);
        cmd.arg("-s").arg("-H");
        match cmd.output() {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim() == "RUNNING"
            }
            Ok(_) => false,
            Err(error) => {
                warn!("lxc-info failed for {}: {error}", handle.name());
                false
            }
        }
    }

    fn init_pid(&self, handle: &Handle) -> Option<i32> {
        let mut cmd = self.command("lxc-info", handle);
        cmd.arg("-p").arg("-H");
        let output = cmd.output().ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }
}
