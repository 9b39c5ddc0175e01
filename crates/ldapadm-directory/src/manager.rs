//! Object manager: safe lookup and mutation primitives over one bound connection.

use crate::{
    entry::{LdapEntry, SearchItem},
    modify::{modify_diff, DirectoryModification},
    options::ConnectionOptions,
    session::{LdapConnector, LdapSession, RealLdapConnector, SearchScope},
    Result,
};
use ldapadm_core::{AuthMode, ConnectionSettings, Error};
use std::collections::BTreeMap;
use tracing::{debug, info};
use url::Url;

/// Attribute list that asks the server for no attributes at all (RFC 4511 `1.1`).
pub const NO_ATTRIBUTES: &str = "1.1";

/// Filter matching any entry, used to read an entry by DN.
const ANY_OBJECT: &str = "(objectClass=*)";

/// Owns one authenticated directory connection and exposes the operations the
/// administrative layer composes.
///
/// Every method awaits a single request/response exchange before returning; calls are
/// never pipelined, so operations reach the server strictly in call order.
pub struct ObjectManager {
    session: Box<dyn LdapSession>,
}

impl ObjectManager {
    /// Opens a connection to the directory and binds it according to `settings.auth`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for unknown connection options or missing credentials,
    /// and [`Error::AuthenticationError`] if the bind is rejected.
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        Self::connect_with(&RealLdapConnector, settings).await
    }

    pub(crate) async fn connect_with(
        connector: &dyn LdapConnector,
        settings: &ConnectionSettings,
    ) -> Result<Self> {
        let options = ConnectionOptions::from_options(&settings.options)?;
        let uri = options.uri.clone().unwrap_or_else(|| settings.uri.clone());

        // Credentials are checked before the connection is opened.
        let credentials = match settings.auth {
            AuthMode::Simple => Some(settings.credentials.as_ref().ok_or_else(|| {
                Error::ConfigError("simple authentication requires credentials".to_string())
            })?),
            AuthMode::Kerberos | AuthMode::None => None,
        };

        let mut session = connector.connect(&uri, &options).await?;

        match settings.auth {
            AuthMode::None => {
                debug!(uri = %uri, "anonymous connection; skipping bind");
            }
            AuthMode::Simple => {
                if let Some(credentials) = credentials {
                    session
                        .simple_bind(credentials.username(), credentials.password())
                        .await
                        .map_err(authentication_error)?;
                    info!(uri = %uri, user = credentials.username(), "simple bind succeeded");
                }
            }
            AuthMode::Kerberos => {
                let host = server_host(&uri)?;
                session
                    .sasl_gssapi_bind(&host)
                    .await
                    .map_err(authentication_error)?;
                info!(uri = %uri, "GSSAPI bind succeeded");
            }
        }

        Ok(Self { session })
    }

    #[cfg(test)]
    pub(crate) fn from_session(session: Box<dyn LdapSession>) -> Self {
        Self { session }
    }

    /// Searches for exactly one entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no entry matches and [`Error::AmbiguousResult`] when
    /// more than one does. References never count as matches.
    pub async fn get_single(
        &mut self,
        base: &str,
        filter: &str,
        scope: SearchScope,
        attributes: &[String],
    ) -> Result<LdapEntry> {
        let mut entries = self.get_multiple(base, filter, scope, attributes).await?;
        match entries.len() {
            0 => Err(Error::NotFound(format!(
                "No results found for single-object query: base: '{base}' filter: '{filter}'"
            ))),
            1 => Ok(entries.remove(0)),
            _ => Err(Error::AmbiguousResult {
                base: base.to_string(),
                filter: filter.to_string(),
                dns: entries.into_iter().map(|entry| entry.dn).collect(),
            }),
        }
    }

    /// Searches for any number of entries, in server order, with references removed.
    ///
    /// # Errors
    ///
    /// Propagates directory errors; zero matches is not an error.
    pub async fn get_multiple(
        &mut self,
        base: &str,
        filter: &str,
        scope: SearchScope,
        attributes: &[String],
    ) -> Result<Vec<LdapEntry>> {
        debug!(base, filter, ?scope, ?attributes, "directory search");
        let items = self.session.search(base, scope, filter, attributes).await?;
        let total = items.len();
        let entries: Vec<LdapEntry> = items.into_iter().filter_map(SearchItem::into_entry).collect();
        if entries.len() != total {
            debug!(references = total - entries.len(), "discarded search references");
        }
        Ok(entries)
    }

    /// Appends `values` to `attribute` of the entry at `dn`, creating the attribute if needed.
    ///
    /// The entry is read, the new value list computed, and only the difference written back.
    /// Read and write are separate requests; a concurrent change to the same values between
    /// them is not detected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry does not exist.
    pub async fn add_attribute(&mut self, dn: &str, attribute: &str, values: &[String]) -> Result<()> {
        let (key, old) = self.read_attribute(dn, attribute).await?;
        let mut new = old.clone();
        new.entry(key).or_default().extend(values.iter().cloned());
        self.write_diff(dn, &old, &new).await
    }

    /// Removes the first occurrence of each of `values` from `attribute` of the entry at `dn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueNotFound`] if any value is not present; nothing is written then.
    pub async fn remove_attribute(
        &mut self,
        dn: &str,
        attribute: &str,
        values: &[String],
    ) -> Result<()> {
        let (key, old) = self.read_attribute(dn, attribute).await?;
        let mut new = old.clone();
        let current = new.entry(key).or_default();
        for value in values {
            let idx = current
                .iter()
                .position(|existing| existing == value)
                .ok_or_else(|| Error::ValueNotFound {
                    dn: dn.to_string(),
                    attribute: attribute.to_string(),
                    value: value.clone(),
                })?;
            current.remove(idx);
        }
        self.write_diff(dn, &old, &new).await
    }

    /// Creates an entry at `dn`.
    ///
    /// Attributes without values are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] before contacting the server if no attribute has a value.
    pub async fn create_object(
        &mut self,
        dn: &str,
        attributes: &BTreeMap<String, Vec<String>>,
    ) -> Result<()> {
        let attributes: Vec<(String, Vec<String>)> = attributes
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(attribute, values)| (attribute.clone(), values.clone()))
            .collect();
        if attributes.is_empty() {
            return Err(Error::ConfigError(format!(
                "New objects must have at least one attribute (creating '{dn}')"
            )));
        }

        self.session.add(dn, &attributes).await?;
        info!(dn, "created entry");
        Ok(())
    }

    /// Deletes the entry at `dn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if there is no such entry.
    pub async fn delete_object(&mut self, dn: &str) -> Result<()> {
        self.session.delete(dn).await.map_err(|err| match err {
            Error::NotFound(detail) => Error::NotFound(format!("no such object '{dn}': {detail}")),
            other => other,
        })?;
        info!(dn, "deleted entry");
        Ok(())
    }

    /// Unbinds and closes the connection.
    ///
    /// # Errors
    ///
    /// Propagates transport errors from the unbind request.
    pub async fn close(mut self) -> Result<()> {
        self.session.unbind().await
    }

    /// Reads one attribute of an entry, returning the server's spelling of its name and a
    /// single-attribute map of its current values.
    async fn read_attribute(
        &mut self,
        dn: &str,
        attribute: &str,
    ) -> Result<(String, BTreeMap<String, Vec<String>>)> {
        let entry = self
            .get_single(dn, ANY_OBJECT, SearchScope::Base, &[attribute.to_string()])
            .await?;
        let key = entry
            .attribute_key(attribute)
            .unwrap_or(attribute)
            .to_string();
        let mut current = BTreeMap::new();
        if let Some(values) = entry.attributes.get(&key) {
            current.insert(key.clone(), values.clone());
        }
        Ok((key, current))
    }

    async fn write_diff(
        &mut self,
        dn: &str,
        old: &BTreeMap<String, Vec<String>>,
        new: &BTreeMap<String, Vec<String>>,
    ) -> Result<()> {
        let modifications: Vec<DirectoryModification> = modify_diff(old, new);
        if modifications.is_empty() {
            debug!(dn, "no changes to write");
            return Ok(());
        }
        debug!(dn, ?modifications, "modifying entry");
        self.session.modify(dn, &modifications).await?;
        info!(dn, "modified entry");
        Ok(())
    }
}

fn authentication_error(err: Error) -> Error {
    match err {
        Error::AuthenticationError(_) | Error::ConfigError(_) => err,
        other => Error::AuthenticationError(other.to_string()),
    }
}

fn server_host(uri: &str) -> Result<String> {
    Url::parse(uri)?
        .host_str()
        .map(ToString::to_string)
        .ok_or_else(|| Error::ConfigError(format!("directory URI '{uri}' has no host")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockLdapConnector, MockLdapSession};
    use ldapadm_core::{Credentials, OptionValue};
    use mockall::predicate::eq;
    use std::time::Duration;

    const URI: &str = "ldaps://foo.bar:636";
    const DN: &str = "cn=foo,dc=bar,dc=baz";
    const ATTR: &str = "awesome list";

    fn person(name: &str) -> SearchItem {
        let mut attributes = BTreeMap::new();
        attributes.insert("name".to_string(), vec![name.to_string()]);
        SearchItem::Entry(LdapEntry::new(
            format!("CN={name},OU=People,DC=foo,DC=bar"),
            attributes,
        ))
    }

    fn reference() -> SearchItem {
        SearchItem::Reference(vec!["ldaps://foo.bar/cn=ref".to_string()])
    }

    fn entry_with(values: &[&str]) -> SearchItem {
        let mut attributes = BTreeMap::new();
        if !values.is_empty() {
            attributes.insert(
                ATTR.to_string(),
                values.iter().map(ToString::to_string).collect(),
            );
        }
        SearchItem::Entry(LdapEntry::new(DN, attributes))
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn connector_for(session: MockLdapSession) -> MockLdapConnector {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(move |_, _| Ok(Box::new(session) as Box<dyn LdapSession>));
        connector
    }

    fn manager_returning(items: Vec<SearchItem>) -> ObjectManager {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .returning(move |_, _, _, _| Ok(items.clone()));
        ObjectManager::from_session(Box::new(session))
    }

    #[tokio::test]
    async fn unknown_option_fails_before_connecting() {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().never();
        let settings = ConnectionSettings::new(URI, AuthMode::Kerberos)
            .with_option("OPT_BOGUS", OptionValue::Int(1));

        let result = ObjectManager::connect_with(&connector, &settings).await;
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn anonymous_connection_never_binds() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().never();
        session.expect_sasl_gssapi_bind().never();
        let connector = connector_for(session);

        let settings = ConnectionSettings::new(URI, AuthMode::None);
        assert!(ObjectManager::connect_with(&connector, &settings).await.is_ok());
    }

    #[tokio::test]
    async fn simple_auth_binds_with_credentials() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .with(eq("foo"), eq("bar"))
            .times(1)
            .returning(|_, _| Ok(()));
        session.expect_sasl_gssapi_bind().never();
        let connector = connector_for(session);

        let settings = ConnectionSettings::new(URI, AuthMode::Simple)
            .with_credentials(Credentials::new("foo", "bar".to_string().into()));
        assert!(ObjectManager::connect_with(&connector, &settings).await.is_ok());
    }

    #[tokio::test]
    async fn simple_auth_without_credentials_is_config_error() {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().never();
        let settings = ConnectionSettings::new(URI, AuthMode::Simple);

        let result = ObjectManager::connect_with(&connector, &settings).await;
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn rejected_bind_is_authentication_error() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().returning(|_, _| {
            Err(Error::DirectoryError {
                code: 53,
                message: "unwilling to perform".to_string(),
            })
        });
        let connector = connector_for(session);

        let settings = ConnectionSettings::new(URI, AuthMode::Simple)
            .with_credentials(Credentials::new("foo", "wrong".to_string().into()));
        let result = ObjectManager::connect_with(&connector, &settings).await;
        assert!(matches!(result, Err(Error::AuthenticationError(_))));
    }

    #[tokio::test]
    async fn kerberos_auth_binds_against_uri_host() {
        let mut session = MockLdapSession::new();
        session
            .expect_sasl_gssapi_bind()
            .with(eq("foo.bar"))
            .times(1)
            .returning(|_| Ok(()));
        session.expect_simple_bind().never();
        let connector = connector_for(session);

        let settings = ConnectionSettings::new(URI, AuthMode::Kerberos);
        assert!(ObjectManager::connect_with(&connector, &settings).await.is_ok());
    }

    #[tokio::test]
    async fn options_are_applied_to_connection() {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .withf(|uri, options| {
                uri == "ldaps://baz.bar"
                    && options.connect_timeout == Some(Duration::from_secs(5))
                    && options.tls_verify
            })
            .times(1)
            .return_once(|_, _| Ok(Box::new(MockLdapSession::new()) as Box<dyn LdapSession>));

        let settings = ConnectionSettings::new(URI, AuthMode::None)
            .with_option("OPT_REFERRALS", OptionValue::Int(0))
            .with_option("OPT_NETWORK_TIMEOUT", OptionValue::Int(5))
            .with_option("OPT_URI", OptionValue::Text("ldaps://baz.bar".to_string()));
        assert!(ObjectManager::connect_with(&connector, &settings).await.is_ok());
    }

    #[tokio::test]
    async fn get_single_fails_for_no_results() {
        let mut manager = manager_returning(Vec::new());
        let err = manager
            .get_single("ou=People,dc=foo", "(name=nobody)", SearchScope::Subtree, &[])
            .await
            .unwrap_err();
        match err {
            Error::NotFound(message) => {
                assert!(message.contains("ou=People,dc=foo"));
                assert!(message.contains("(name=nobody)"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_single_fails_for_only_references() {
        let mut manager = manager_returning(vec![reference()]);
        let result = manager.get_single("", "", SearchScope::Subtree, &[]).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn get_single_returns_exactly_one_object() {
        let mut manager = manager_returning(vec![person("bob"), reference()]);
        let entry = manager
            .get_single("", "(name=bob)", SearchScope::Subtree, &[])
            .await
            .unwrap();
        assert_eq!(Some(entry), person("bob").into_entry());
    }

    #[tokio::test]
    async fn ambiguous_results_are_rejected_but_enumerable() {
        let expected = vec![person("fred"), person("george")];
        let mut manager = manager_returning(expected.clone());

        let err = manager
            .get_single("dc=foo", "(name=*)", SearchScope::Subtree, &[])
            .await
            .unwrap_err();
        match err {
            Error::AmbiguousResult { base, filter, dns } => {
                assert_eq!(base, "dc=foo");
                assert_eq!(filter, "(name=*)");
                assert_eq!(dns.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let all = manager
            .get_multiple("dc=foo", "(name=*)", SearchScope::Subtree, &[])
            .await
            .unwrap();
        let expected: Vec<LdapEntry> = expected.into_iter().filter_map(SearchItem::into_entry).collect();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn get_multiple_removes_references_in_order() {
        let susie = person("susie");
        let items = vec![
            reference(),
            susie.clone(),
            susie.clone(),
            reference(),
            reference(),
            person("sam"),
            susie.clone(),
            reference(),
            susie.clone(),
            reference(),
        ];
        let mut manager = manager_returning(items);
        let result = manager
            .get_multiple("", "(name=s*)", SearchScope::Subtree, &[])
            .await
            .unwrap();

        let names: Vec<&str> = result.iter().filter_map(|e| e.first("name")).collect();
        assert_eq!(names, vec!["susie", "susie", "sam", "susie", "susie"]);
    }

    #[tokio::test]
    async fn get_multiple_allows_zero_results() {
        let mut manager = manager_returning(vec![reference()]);
        let result = manager
            .get_multiple("", "(name=x)", SearchScope::Subtree, &[])
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn add_attribute_reads_entry_and_writes_diff() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .withf(|base, scope, filter, attributes| {
                base == DN
                    && *scope == SearchScope::Base
                    && filter == ANY_OBJECT
                    && attributes == [ATTR.to_string()]
            })
            .times(1)
            .returning(|_, _, _, _| Ok(vec![entry_with(&["item 1"])]));
        session
            .expect_modify()
            .withf(|dn, modifications| {
                dn == DN
                    && modifications
                        == [DirectoryModification::Add {
                            attribute: ATTR.to_string(),
                            values: vec!["item 2".to_string()],
                        }]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut manager = ObjectManager::from_session(Box::new(session));
        manager
            .add_attribute(DN, ATTR, &strings(&["item 2"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn add_attribute_creates_missing_attribute() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .returning(|_, _, _, _| Ok(vec![entry_with(&[])]));
        session
            .expect_modify()
            .withf(|_, modifications| {
                modifications
                    == [DirectoryModification::Add {
                        attribute: ATTR.to_string(),
                        values: vec!["item 1".to_string()],
                    }]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut manager = ObjectManager::from_session(Box::new(session));
        manager
            .add_attribute(DN, ATTR, &strings(&["item 1"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn add_attribute_on_missing_entry_is_not_found() {
        let mut session = MockLdapSession::new();
        session.expect_search().returning(|_, _, _, _| Ok(Vec::new()));
        session.expect_modify().never();

        let mut manager = ObjectManager::from_session(Box::new(session));
        let result = manager.add_attribute(DN, ATTR, &strings(&["item 1"])).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn remove_attribute_deletes_value() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .returning(|_, _, _, _| Ok(vec![entry_with(&["item 1", "item 2"])]));
        session
            .expect_modify()
            .withf(|dn, modifications| {
                dn == DN
                    && modifications
                        == [DirectoryModification::Delete {
                            attribute: ATTR.to_string(),
                            values: vec!["item 2".to_string()],
                        }]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut manager = ObjectManager::from_session(Box::new(session));
        manager
            .remove_attribute(DN, ATTR, &strings(&["item 2"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn remove_last_value_deletes_attribute() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .returning(|_, _, _, _| Ok(vec![entry_with(&["item 1"])]));
        session
            .expect_modify()
            .withf(|_, modifications| {
                modifications
                    == [DirectoryModification::Delete {
                        attribute: ATTR.to_string(),
                        values: Vec::new(),
                    }]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut manager = ObjectManager::from_session(Box::new(session));
        manager
            .remove_attribute(DN, ATTR, &strings(&["item 1"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn remove_missing_value_is_value_not_found() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .returning(|_, _, _, _| Ok(vec![entry_with(&["item 1"])]));
        session.expect_modify().never();

        let mut manager = ObjectManager::from_session(Box::new(session));
        let result = manager
            .remove_attribute(DN, ATTR, &strings(&["item 3"]))
            .await;
        assert!(matches!(
            result,
            Err(Error::ValueNotFound { ref value, .. }) if value == "item 3"
        ));
    }

    #[tokio::test]
    async fn attribute_names_match_case_insensitively() {
        let mut session = MockLdapSession::new();
        session.expect_search().returning(|_, _, _, _| {
            let mut attributes = BTreeMap::new();
            attributes.insert("uniqueMember".to_string(), vec!["uid=a".to_string()]);
            Ok(vec![SearchItem::Entry(LdapEntry::new(DN, attributes))])
        });
        session
            .expect_modify()
            .withf(|_, modifications| {
                modifications
                    == [DirectoryModification::Add {
                        attribute: "uniqueMember".to_string(),
                        values: vec!["uid=b".to_string()],
                    }]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut manager = ObjectManager::from_session(Box::new(session));
        manager
            .add_attribute(DN, "uniquemember", &strings(&["uid=b"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_object_requires_attributes() {
        let mut session = MockLdapSession::new();
        session.expect_add().never();

        let mut manager = ObjectManager::from_session(Box::new(session));
        let result = manager.create_object("cn=bogus", &BTreeMap::new()).await;
        assert!(matches!(result, Err(Error::ConfigError(_))));

        let mut only_empty = BTreeMap::new();
        only_empty.insert("description".to_string(), Vec::new());
        let result = manager.create_object("cn=bogus", &only_empty).await;
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn create_object_submits_add() {
        let dn = "cn=awesome,cn=users,dc=ldap,dc=test";
        let mut attributes = BTreeMap::new();
        attributes.insert("objectClass".to_string(), strings(&["posixAccount"]));
        attributes.insert("uidNumber".to_string(), strings(&["123456"]));

        let mut session = MockLdapSession::new();
        session
            .expect_add()
            .withf(move |target, attrs| {
                target == dn
                    && attrs
                        == [
                            ("objectClass".to_string(), strings(&["posixAccount"])),
                            ("uidNumber".to_string(), strings(&["123456"])),
                        ]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut manager = ObjectManager::from_session(Box::new(session));
        manager.create_object(dn, &attributes).await.unwrap();
    }

    #[tokio::test]
    async fn delete_object_passes_through() {
        let mut session = MockLdapSession::new();
        session
            .expect_delete()
            .with(eq("cn=deleteme"))
            .times(1)
            .returning(|_| Ok(()));

        let mut manager = ObjectManager::from_session(Box::new(session));
        manager.delete_object("cn=deleteme").await.unwrap();
    }

    #[tokio::test]
    async fn delete_missing_object_is_not_found() {
        let mut session = MockLdapSession::new();
        session
            .expect_delete()
            .returning(|_| Err(Error::NotFound("rc=32 (noSuchObject)".to_string())));

        let mut manager = ObjectManager::from_session(Box::new(session));
        let err = manager.delete_object("cn=ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(ref message) if message.contains("cn=ghost")));
    }
}
