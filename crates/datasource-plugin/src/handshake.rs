//! Startup handshake with the host process
//!
//! The host launches the plugin with a magic cookie in the environment and,
//! optionally, the list of protocol versions it speaks. The plugin refuses to
//! serve unless both match, then prints one line on stdout telling the host
//! where to connect.

use std::net::SocketAddr;

use crate::protocol::ProtocolError;

/// Version of the launcher protocol (the stdout line format)
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying the versions the host accepts
pub const PROTOCOL_VERSIONS_ENV: &str = "PLUGIN_PROTOCOL_VERSIONS";

/// Transport named in the announce line
pub const TRANSPORT: &str = "websocket";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    pub protocol_version: u32,
    pub magic_cookie_key: String,
    pub magic_cookie_value: String,
}

impl HandshakeConfig {
    /// Handshake for the "datasource" plugin category
    pub fn datasource() -> Self {
        Self {
            protocol_version: 1,
            magic_cookie_key: "grafana_plugin_type".into(),
            magic_cookie_value: "datasource".into(),
        }
    }

    /// Verify against the process environment
    pub fn verify(&self) -> Result<(), ProtocolError> {
        self.verify_with(|key| std::env::var(key).ok())
    }

    /// Verify against an arbitrary variable lookup
    pub fn verify_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ProtocolError> {
        if lookup(&self.magic_cookie_key).as_deref() != Some(self.magic_cookie_value.as_str()) {
            return Err(ProtocolError::CookieMismatch {
                key: self.magic_cookie_key.clone(),
            });
        }

        if let Some(offered) = lookup(PROTOCOL_VERSIONS_ENV) {
            let supported = offered
                .split(',')
                .filter_map(|v| v.trim().parse::<u32>().ok())
                .any(|v| v == self.protocol_version);
            if !supported {
                return Err(ProtocolError::UnsupportedVersion {
                    offered,
                    supported: self.protocol_version,
                });
            }
        }

        Ok(())
    }

    /// The line written to stdout once the listener is bound
    pub fn announce(&self, addr: SocketAddr) -> String {
        format!(
            "{}|{}|tcp|{}|{}",
            CORE_PROTOCOL_VERSION, self.protocol_version, addr, TRANSPORT
        )
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self::datasource()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn matching_cookie_passes() {
        let hs = HandshakeConfig::datasource();
        assert!(hs.verify_with(env(&[("grafana_plugin_type", "datasource")])).is_ok());
    }

    #[test]
    fn missing_or_wrong_cookie_fails() {
        let hs = HandshakeConfig::datasource();
        assert!(matches!(
            hs.verify_with(env(&[])),
            Err(ProtocolError::CookieMismatch { .. })
        ));
        assert!(matches!(
            hs.verify_with(env(&[("grafana_plugin_type", "panel")])),
            Err(ProtocolError::CookieMismatch { .. })
        ));
    }

    #[test]
    fn protocol_version_must_be_offered() {
        let hs = HandshakeConfig::datasource();
        let ok = env(&[
            ("grafana_plugin_type", "datasource"),
            (PROTOCOL_VERSIONS_ENV, "2, 1"),
        ]);
        assert!(hs.verify_with(ok).is_ok());

        let bad = env(&[
            ("grafana_plugin_type", "datasource"),
            (PROTOCOL_VERSIONS_ENV, "2,3"),
        ]);
        assert!(matches!(
            hs.verify_with(bad),
            Err(ProtocolError::UnsupportedVersion { supported: 1, .. })
        ));
    }

    #[test]
    fn announce_line_names_address_and_transport() {
        let hs = HandshakeConfig::datasource();
        let addr: SocketAddr = "127.0.0.1:4242".parse().unwrap();
        assert_eq!(hs.announce(addr), "1|1|tcp|127.0.0.1:4242|websocket");
    }
}
