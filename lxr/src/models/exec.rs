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
use std::collections::HashMap;
use std::os::fd::RawFd;

/// Where the attached process's stdio ends up. The fds are borrowed, the
/// caller keeps them alive until the attach returns.
#[derive(Copy, Clone, Debug)]
pub enum AttachStdio {
    /// All three streams on the subordinate end of a pty pair
    Terminal { tty: RawFd },
    Forward {
        stdin: RawFd,
        stdout: RawFd,
        stderr: RawFd,
    },
}

/// Parameters for a command executed inside a running container. The
/// environment is applied as-is after clearing the inherited one; it is
/// never merged.
#[derive(Clone, Debug)]
pub struct AttachSpec {
    pub command: Vec<String>,
    pub envs: HashMap<String, String>,
    pub work_dir: Option<String>,
    pub stdio: AttachStdio,
}

impl AttachSpec {
    pub fn new(command: Vec<String>, envs: HashMap<String, String>, stdio: AttachStdio) -> AttachSpec {
        // HOME doubles as the working directory for the attached process
        let work_dir = envs.get("HOME").cloned();
        AttachSpec {
            command,
            envs,
            work_dir,
            stdio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AttachSpec, AttachStdio};
    use std::collections::HashMap;

    #[test]
    fn test_home_seeds_work_dir() {
        let mut envs = HashMap::new();
        envs.insert("HOME".to_string(), "/root".to_string());
        let spec = AttachSpec::new(
            vec!["sh".to_string()],
            envs,
            AttachStdio::Forward {
                stdin: 0,
                stdout: 1,
                stderr: 2,
            },
        );
        assert_eq!(spec.work_dir.as_deref(), Some("/root"));

        let spec = AttachSpec::new(
            vec!["sh".to_string()],
            HashMap::new(),
            AttachStdio::Forward {
                stdin: 0,
                stdout: 1,
                stderr: 2,
            },
        );
        assert_eq!(spec.work_dir, None);
    }
}
