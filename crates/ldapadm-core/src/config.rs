//! Configuration structures for the directory administration tool.
//!
//! The configuration is a single YAML document. A handful of top-level keys describe the
//! directory connection; every other top-level key names an item type ("user", "group",
//! "access", ...) and maps it to a base DN, identifier attribute, display attributes and a
//! schema template.

use crate::Error;
use secrecy::{ExposeSecret, SecretString};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;
use validator::Validate;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ldapadm.conf.yaml";

/// Attribute that holds group membership when an item type declares none.
pub const DEFAULT_MEMBER_ATTRIBUTE: &str = "member";

/// Authentication mode used when binding the directory connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AuthMode {
    /// SASL/GSSAPI bind using the ambient Kerberos credential cache.
    Kerberos,
    /// Simple bind with a username and password.
    Simple,
    /// Anonymous connection; no bind is performed.
    #[default]
    None,
}

impl AuthMode {
    /// Canonical configuration name of the mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Kerberos => "kerberos",
            Self::Simple => "simple",
            Self::None => "none",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kerberos" | "kerb" | "gssapi" => Ok(Self::Kerberos),
            "simple" => Ok(Self::Simple),
            "none" | "noauth" | "anonymous" => Ok(Self::None),
            other => Err(Error::ConfigError(format!(
                "'{other}' is not a supported authentication method"
            ))),
        }
    }
}

impl TryFrom<String> for AuthMode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AuthMode> for String {
    fn from(mode: AuthMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Scalar value of a low-level connection option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// Boolean flag
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Free-form text
    Text(String),
}

impl OptionValue {
    /// Interprets the value as a number, accepting numeric strings.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    /// Interprets the value as an integer, accepting numeric strings.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
            Self::Bool(_) | Self::Float(_) => None,
        }
    }

    /// Returns the value as text if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// C-style truthiness: non-zero numbers, `true`, and strings other than `0`/`false`/`off`.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            Self::Text(text) => !matches!(
                text.trim().to_ascii_lowercase().as_str(),
                "" | "0" | "false" | "off" | "no"
            ),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Ordered attribute values from a schema template.
///
/// YAML scalars (strings, numbers, booleans) are accepted as single values so that
/// `uidNumber: 1000` and `uidNumber: ["1000"]` mean the same thing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct AttributeValues(Vec<String>);

impl AttributeValues {
    /// Borrows the values.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<'de> Deserialize<'de> for AttributeValues {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Sequence(items) => items
                .iter()
                .map(|item| {
                    scalar_to_string(item)
                        .ok_or_else(|| de::Error::custom("attribute values must be scalars"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self),
            Value::Null => Ok(Self::default()),
            other => scalar_to_string(&other)
                .map(|value| Self(vec![value]))
                .ok_or_else(|| de::Error::custom("attribute values must be scalars")),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn default_member_attribute() -> String {
    DEFAULT_MEMBER_ATTRIBUTE.to_string()
}

/// Item type section as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ItemTypeConfig {
    /// Search base; falls back to the top-level `base`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    /// Attribute holding the human-facing name of the item
    #[validate(length(min = 1))]
    pub identifier: String,

    /// Attributes returned by `get` and `search`; empty means all
    #[serde(default)]
    pub display: Vec<String>,

    /// Attributes matched by `search`; empty means the identifier
    #[serde(default)]
    pub search: Vec<String>,

    /// Attribute holding group members
    #[validate(length(min = 1))]
    #[serde(default = "default_member_attribute")]
    pub member: String,

    /// Attributes of newly created entries
    #[serde(default)]
    pub schema: BTreeMap<String, AttributeValues>,

    /// Extra filter AND-ed into every search of this type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Resolved, read-only descriptor of one item type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemType {
    /// Item type name as used on the command line
    pub name: String,
    /// Search base DN
    pub base: String,
    /// Identifier attribute
    pub identifier: String,
    /// Display attributes (empty = all)
    pub display: Vec<String>,
    /// Attributes matched by prefix searches (never empty)
    pub search: Vec<String>,
    /// Membership attribute
    pub member: String,
    /// Schema template for created entries
    pub schema: BTreeMap<String, Vec<String>>,
    /// Optional type-level filter
    pub filter: Option<String>,
}

/// Simple-bind credentials.
#[derive(Debug)]
pub struct Credentials {
    username: String,
    password: SecretString,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// Bind DN or user name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Bind password.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Everything needed to open and bind a directory connection.
#[derive(Debug)]
pub struct ConnectionSettings {
    /// Directory URI (`ldap://` or `ldaps://`)
    pub uri: String,
    /// Authentication mode
    pub auth: AuthMode,
    /// Credentials for simple binds
    pub credentials: Option<Credentials>,
    /// Low-level connection options keyed by option name
    pub options: BTreeMap<String, OptionValue>,
}

impl ConnectionSettings {
    /// Creates anonymous settings without options.
    #[must_use]
    pub fn new(uri: impl Into<String>, auth: AuthMode) -> Self {
        Self {
            uri: uri.into(),
            auth,
            credentials: None,
            options: BTreeMap::new(),
        }
    }

    /// Attaches simple-bind credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets a connection option.
    #[must_use]
    pub fn with_option(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.options.insert(name.into(), value);
        self
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

/// Complete tool configuration.
#[derive(Debug, Deserialize, Validate)]
pub struct ToolConfig {
    /// Directory URI
    #[validate(url)]
    pub uri: String,

    /// Authentication mode
    #[serde(default)]
    pub auth_type: AuthMode,

    /// User name for simple binds
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "deserialize_secret")]
    password: Option<SecretString>,

    /// Fallback search base for item types without one
    #[serde(default)]
    pub base: Option<String>,

    /// Low-level connection options
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,

    #[serde(flatten)]
    item_types: BTreeMap<String, ItemTypeConfig>,
}

impl ToolConfig {
    /// Parses and validates a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the document is malformed or fails validation.
    pub fn from_yaml_str(document: &str) -> Result<Self, Error> {
        Self::from_value(serde_yaml::from_str(document)?)
    }

    /// Builds the configuration from an already merged YAML value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the value does not describe a valid configuration.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_value(value)?;
        config.validate()?;
        for (name, item_type) in &config.item_types {
            item_type
                .validate()
                .map_err(|e| Error::ConfigError(format!("item type '{name}': {e}")))?;
        }
        Ok(config)
    }

    /// Loads the configuration file and applies command-line YAML overrides in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IoError`] if the file cannot be read and [`Error::ConfigError`] if
    /// the file or any override is not valid YAML or the result fails validation.
    pub fn load(path: impl AsRef<Path>, overrides: &[String]) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|err| {
            Error::IoError(format!("failed to read {}: {err}", path.display()))
        })?;
        let mut document: Value = serde_yaml::from_str(&contents)?;
        for fragment in overrides {
            let overlay: Value = serde_yaml::from_str(fragment)?;
            if !overlay.is_mapping() {
                return Err(Error::ConfigError(format!(
                    "option override '{fragment}' is not a YAML mapping"
                )));
            }
            merge_yaml(overlay, &mut document);
        }
        Self::from_value(document)
    }

    /// Switches to kerberos authentication.
    #[must_use]
    pub fn with_kerberos(mut self) -> Self {
        self.auth_type = AuthMode::Kerberos;
        self
    }

    /// Switches to anonymous access.
    #[must_use]
    pub fn with_anonymous(mut self) -> Self {
        self.auth_type = AuthMode::None;
        self
    }

    /// Switches to simple authentication with the given credentials.
    #[must_use]
    pub fn with_simple_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.auth_type = AuthMode::Simple;
        self.username = Some(username.into());
        self.password = password.map(SecretString::from);
        self
    }

    /// Names of all configured item types.
    pub fn item_type_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.item_types.keys().map(String::as_str)
    }

    /// Resolves the descriptor for an item type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the type is not configured or has no base DN.
    pub fn item_type(&self, name: &str) -> Result<ItemType, Error> {
        let raw = self.item_types.get(name).ok_or_else(|| {
            Error::ConfigError(format!("unknown item type '{name}'"))
        })?;
        let base = raw
            .base
            .clone()
            .or_else(|| self.base.clone())
            .ok_or_else(|| Error::ConfigError(format!("item type '{name}' has no base")))?;
        let search = if raw.search.is_empty() {
            vec![raw.identifier.clone()]
        } else {
            raw.search.clone()
        };

        Ok(ItemType {
            name: name.to_string(),
            base,
            identifier: raw.identifier.clone(),
            display: raw.display.clone(),
            search,
            member: raw.member.clone(),
            schema: raw
                .schema
                .iter()
                .map(|(attribute, values)| (attribute.clone(), values.as_slice().to_vec()))
                .collect(),
            filter: raw.filter.clone(),
        })
    }

    /// Builds the connection settings for the configured auth mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if simple authentication is selected without a username.
    pub fn connection_settings(&self) -> Result<ConnectionSettings, Error> {
        let mut settings = ConnectionSettings::new(self.uri.clone(), self.auth_type);
        settings.options = self.options.clone();

        if self.auth_type == AuthMode::Simple {
            let username = self.username.clone().ok_or_else(|| {
                Error::ConfigError("simple authentication requires a username".to_string())
            })?;
            let password = self
                .password
                .as_ref()
                .map_or_else(String::new, |secret| secret.expose_secret().to_string());
            settings = settings.with_credentials(Credentials::new(username, SecretString::from(password)));
        }

        Ok(settings)
    }
}

/// Recursively merges `overlay` into `base`.
///
/// Nested mappings are merged key by key; any other value in `overlay` replaces the value
/// in `base`.
pub fn merge_yaml(overlay: Value, base: &mut Value) {
    match (overlay, base) {
        (Value::Mapping(overlay), Value::Mapping(base)) => {
            for (key, value) in overlay {
                let nested = value.is_mapping() && base.get(&key).is_some_and(Value::is_mapping);
                if !nested {
                    base.insert(key, value);
                } else if let Some(existing) = base.get_mut(&key) {
                    merge_yaml(value, existing);
                }
            }
        }
        (overlay, base) => *base = overlay,
    }
}
