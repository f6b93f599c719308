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
use thiserror::Error;

/// A device is a named bag of string attributes; `type` is mandatory, the
/// remaining attributes depend on it.
pub type Device = HashMap<String, String>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device {0} has no type attribute")]
    MissingType(String),
    #[error("device {name} has unsupported type {kind}")]
    UnsupportedType { name: String, kind: String },
    #[error("device {name} is missing attribute {attr}")]
    MissingAttr { name: String, attr: String },
}

pub fn device_type<'a>(name: &str, device: &'a Device) -> Result<&'a str, DeviceError> {
    device
        .get("type")
        .map(|s| s.as_str())
        .ok_or_else(|| DeviceError::MissingType(name.to_string()))
}

fn required<'a>(name: &str, device: &'a Device, attr: &str) -> Result<&'a str, DeviceError> {
    device
        .get(attr)
        .map(|s| s.as_str())
        .ok_or_else(|| DeviceError::MissingAttr {
            name: name.to_string(),
            attr: attr.to_string(),
        })
}

/// Translate one device into runtime config items. The item vocabulary is
/// the lxc one; anything this function cannot express is a hard error, the
/// materializer does not half-apply devices.
pub fn to_runtime_items(name: &str, device: &Device) -> Result<Vec<(String, String)>, DeviceError> {
    match device_type(name, device)? {
        "none" => Ok(Vec::new()),
        "nic" => {
            let parent = required(name, device, "parent")?;
            let mut items = vec![
                ("lxc.network.type".to_string(), "veth".to_string()),
                ("lxc.network.flags".to_string(), "up".to_string()),
                ("lxc.network.link".to_string(), parent.to_string()),
            ];
            if let Some(ifname) = device.get("name") {
                items.push(("lxc.network.name".to_string(), ifname.to_string()));
            }
            if let Some(hwaddr) = device.get("hwaddr") {
                items.push(("lxc.network.hwaddr".to_string(), hwaddr.to_string()));
            }
            Ok(items)
        }
        "disk" => {
            let source = required(name, device, "source")?;
            let path = required(name, device, "path")?;
            let target = path.trim_start_matches('/');
            Ok(vec![(
                "lxc.mount.entry".to_string(),
                format!("{source} {target} none bind,create=dir 0 0"),
            )])
        }
        "unix-char" => {
            let major = required(name, device, "major")?;
            let minor = required(name, device, "minor")?;
            Ok(vec![(
                "lxc.cgroup.devices.allow".to_string(),
                format!("c {major}:{minor} rwm"),
            )])
        }
        kind => Err(DeviceError::UnsupportedType {
            name: name.to_string(),
            kind: kind.to_string(),
        }),
    }
}
