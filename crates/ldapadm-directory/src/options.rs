//! Connection-level options.
//!
//! Options are configured by their OpenLDAP names (`OPT_NETWORK_TIMEOUT`, ...) and mapped
//! onto the settings `ldap3` understands. Names outside the supported set are rejected
//! before any connection is attempted.

use ldapadm_core::{Error, OptionValue};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::Result;

/// Override the directory URI.
pub const OPT_URI: &str = "OPT_URI";
/// Connect timeout in seconds.
pub const OPT_NETWORK_TIMEOUT: &str = "OPT_NETWORK_TIMEOUT";
/// Per-operation timeout in seconds.
pub const OPT_TIMEOUT: &str = "OPT_TIMEOUT";
/// Referral chasing; referrals are never chased, they are dropped from results.
pub const OPT_REFERRALS: &str = "OPT_REFERRALS";
/// LDAP protocol version; only 3 is supported.
pub const OPT_PROTOCOL_VERSION: &str = "OPT_PROTOCOL_VERSION";
/// Request StartTLS on plain `ldap://` connections.
pub const OPT_X_TLS: &str = "OPT_X_TLS";
/// Certificate verification policy.
pub const OPT_X_TLS_REQUIRE_CERT: &str = "OPT_X_TLS_REQUIRE_CERT";
/// PEM file with trusted CA certificates.
pub const OPT_X_TLS_CACERTFILE: &str = "OPT_X_TLS_CACERTFILE";

/// Typed connection options.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    /// Replacement for the configured URI.
    pub uri: Option<String>,
    /// Timeout for establishing the connection.
    pub connect_timeout: Option<Duration>,
    /// Timeout applied to every directory operation.
    pub operation_timeout: Option<Duration>,
    /// Whether StartTLS is requested.
    pub starttls: bool,
    /// Whether server certificates are verified.
    pub tls_verify: bool,
    /// Custom CA certificate file.
    pub tls_ca_cert: Option<PathBuf>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            uri: None,
            connect_timeout: None,
            operation_timeout: None,
            starttls: false,
            tls_verify: true,
            tls_ca_cert: None,
        }
    }
}

impl ConnectionOptions {
    /// Builds typed options from configured option names and values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for unknown option names or unusable values.
    pub fn from_options(options: &BTreeMap<String, OptionValue>) -> Result<Self> {
        let mut parsed = Self::default();

        for (name, value) in options {
            match name.as_str() {
                OPT_URI => {
                    parsed.uri = Some(text(name, value)?);
                }
                OPT_NETWORK_TIMEOUT => {
                    parsed.connect_timeout = Some(seconds(name, value)?);
                }
                OPT_TIMEOUT => {
                    parsed.operation_timeout = Some(seconds(name, value)?);
                }
                OPT_REFERRALS => {
                    debug!(value = %value, "referrals are never chased; references are discarded");
                }
                OPT_PROTOCOL_VERSION => {
                    if value.as_i64() != Some(3) {
                        return Err(Error::ConfigError(format!(
                            "{name}: only LDAP protocol version 3 is supported, got {value}"
                        )));
                    }
                }
                OPT_X_TLS => {
                    parsed.starttls = value.is_truthy();
                }
                OPT_X_TLS_REQUIRE_CERT => {
                    parsed.tls_verify = require_cert(name, value)?;
                }
                OPT_X_TLS_CACERTFILE => {
                    parsed.tls_ca_cert = Some(PathBuf::from(text(name, value)?));
                }
                unknown => {
                    return Err(Error::ConfigError(format!(
                        "unknown connection option '{unknown}'"
                    )));
                }
            }
        }

        Ok(parsed)
    }
}

fn text(name: &str, value: &OptionValue) -> Result<String> {
    value
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| Error::ConfigError(format!("{name} expects a string, got {value}")))
}

fn seconds(name: &str, value: &OptionValue) -> Result<Duration> {
    value
        .as_f64()
        .filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| {
            Error::ConfigError(format!("{name} expects a positive number of seconds, got {value}"))
        })
}

/// Maps the OpenLDAP certificate policy onto "verify or not".
///
/// Numeric values follow the OpenLDAP constants: 0 never, 1 hard, 2 demand, 3 allow, 4 try.
fn require_cert(name: &str, value: &OptionValue) -> Result<bool> {
    if let Some(level) = value.as_i64() {
        return match level {
            0 | 3 => Ok(false),
            1 | 2 | 4 => Ok(true),
            _ => Err(Error::ConfigError(format!("{name}: unknown policy {level}"))),
        };
    }
    match value.to_string().to_ascii_lowercase().as_str() {
        "never" | "allow" | "false" => Ok(false),
        "hard" | "demand" | "try" | "true" => Ok(true),
        other => Err(Error::ConfigError(format!("{name}: unknown policy '{other}'"))),
    }
}
