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
use thiserror::Error;

pub const LIMITS_CPUS_MAX: u32 = 65000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown configuration key: {0}")]
    UnknownKey(String),
    #[error("bad value for {key}: {reason}")]
    BadValue { key: String, reason: String },
}

/// One recognized container configuration entry. Everything a container can
/// carry is enumerated here; the only open namespace is `user.*`, which is
/// stored verbatim and never applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigEntry {
    LimitsCpus(u32),
    LimitsMemory(String),
    SecurityPrivileged(bool),
    RawApparmor(String),
    RawLxc(String),
    User(String, String),
}

impl ConfigEntry {
    pub fn parse(key: &str, value: &str) -> Result<ConfigEntry, ConfigError> {
        match key {
            "limits.cpus" => {
                let count: u32 = value.parse().map_err(|_| ConfigError::BadValue {
                    key: key.to_string(),
                    reason: format!("expected an unsigned integer, got {value:?}"),
                })?;
                if count > LIMITS_CPUS_MAX {
                    return Err(ConfigError::BadValue {
                        key: key.to_string(),
                        reason: format!("{count} exceeds the maximum of {LIMITS_CPUS_MAX}"),
                    });
                }
                Ok(ConfigEntry::LimitsCpus(count))
            }
            "limits.memory" => Ok(ConfigEntry::LimitsMemory(value.to_string())),
            "security.privileged" => Ok(ConfigEntry::SecurityPrivileged(truthy(value))),
            "raw.apparmor" => Ok(ConfigEntry::RawApparmor(value.to_string())),
            "raw.lxc" => Ok(ConfigEntry::RawLxc(value.to_string())),
            _ => match key.strip_prefix("user.") {
                Some(suffix) if !suffix.is_empty() => {
                    Ok(ConfigEntry::User(key.to_string(), value.to_string()))
                }
                _ => Err(ConfigError::UnknownKey(key.to_string())),
            },
        }
    }
}

/// `"0"` and `"false"` (any case) mean unprivileged, every other value is
/// taken as privileged.
fn truthy(value: &str) -> bool {
    !(value == "0" || value.eq_ignore_ascii_case("false"))
}

pub fn valid_config_key(key: &str) -> bool {
    ConfigEntry::parse(key, "0").is_ok()
}

/// Whether the stored config map says the container runs privileged.
pub fn is_privileged<'a>(config: impl IntoIterator<Item = (&'a String, &'a String)>) -> bool {
    config
        .into_iter()
        .any(|(k, v)| k == "security.privileged" && truthy(v))
}

/// Split a `raw.lxc` blob into runtime config items: one `key=value` per
/// line, whitespace around both sides trimmed, blank lines skipped.
pub fn parse_raw_lines(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut items = Vec::new();
    for line in raw.split('\n') {
        if line.trim().is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::BadValue {
                key: "raw.lxc".to_string(),
                reason: format!("line {line:?} is not key=value"),
            });
        };
        items.push((key.trim().to_string(), value.trim().to_string()));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::{is_privileged, parse_raw_lines, valid_config_key, ConfigEntry, ConfigError};
    use std::collections::BTreeMap;

    #[test]
    fn test_cpus_parse() {
        assert_eq!(
            ConfigEntry::parse("limits.cpus", "2"),
            Ok(ConfigEntry::LimitsCpus(2))
        );
        assert_eq!(
            ConfigEntry::parse("limits.cpus", "0"),
            Ok(ConfigEntry::LimitsCpus(0))
        );
        assert!(matches!(
            ConfigEntry::parse("limits.cpus", "65001"),
            Err(ConfigError::BadValue { .. })
        ));
        assert!(matches!(
            ConfigEntry::parse("limits.cpus", "two"),
            Err(ConfigError::BadValue { .. })
        ));
        assert!(matches!(
            ConfigEntry::parse("limits.cpus", "-1"),
            Err(ConfigError::BadValue { .. })
        ));
    }

    #[test]
    fn test_privileged_values() {
        for unpriv in ["0", "false", "False", "FALSE"] {
            assert_eq!(
                ConfigEntry::parse("security.privileged", unpriv),
                Ok(ConfigEntry::SecurityPrivileged(false))
            );
        }
        assert_eq!(
            ConfigEntry::parse("security.privileged", "1"),
            Ok(ConfigEntry::SecurityPrivileged(true))
        );
    }

    #[test]
    fn test_user_namespace_is_open() {
        assert_eq!(
            ConfigEntry::parse("user.x", "1"),
            Ok(ConfigEntry::User("user.x".to_string(), "1".to_string()))
        );
        assert_eq!(
            ConfigEntry::parse("user.", "1"),
            Err(ConfigError::UnknownKey("user.".to_string()))
        );
    }

    #[test]
    fn test_unknown_keys_rejected() {
        for key in ["boot.autostart", "limits.cpu", "security.nesting", ""] {
            assert!(!valid_config_key(key), "{key} should be rejected");
        }
        for key in [
            "limits.cpus",
            "limits.memory",
            "security.privileged",
            "raw.apparmor",
            "raw.lxc",
            "user.meta",
        ] {
            assert!(valid_config_key(key), "{key} should be accepted");
        }
    }

    #[test]
    fn test_raw_lines() {
        let items = parse_raw_lines("lxc.aa_profile = unconfined\n\n a = b \n").unwrap();
        assert_eq!(
            items,
            vec![
                ("lxc.aa_profile".to_string(), "unconfined".to_string()),
                ("a".to_string(), "b".to_string()),
            ]
        );
        assert!(parse_raw_lines("no equals sign").is_err());
    }

    #[test]
    fn test_is_privileged() {
        let mut config = BTreeMap::new();
        assert!(!is_privileged(&config));
        config.insert("security.privileged".to_string(), "false".to_string());
        assert!(!is_privileged(&config));
        config.insert("security.privileged".to_string(), "1".to_string());
        assert!(is_privileged(&config));
    }
}
