//! Directory sessions: the seam between the object manager and `ldap3`.

use crate::{
    entry::{LdapEntry, SearchItem},
    modify::DirectoryModification,
    options::ConnectionOptions,
    Result,
};
use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry};
use ldapadm_core::Error;
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fs;
use tracing::{debug, warn};

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    #[default]
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    async fn sasl_gssapi_bind(&mut self, server_fqdn: &str) -> Result<()>;
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<SearchItem>>;
    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()>;
    async fn add(&mut self, dn: &str, attributes: &[(String, Vec<String>)]) -> Result<()>;
    async fn delete(&mut self, dn: &str) -> Result<()>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self, uri: &str, options: &ConnectionOptions)
        -> Result<Box<dyn LdapSession>>;
}

/// Real LDAP connector backed by `ldap3`.
pub(crate) struct RealLdapConnector;

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(
        &self,
        uri: &str,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn LdapSession>> {
        let settings = build_ldap_settings(options)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, uri)
            .await
            .map_err(map_ldap_error)?;
        ldap3::drive!(conn);
        debug!(uri, "directory connection established");
        Ok(Box::new(RealLdapSession {
            inner: ldap,
            options: options.clone(),
        }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
    options: ConnectionOptions,
}

impl RealLdapSession {
    /// Handle for the next operation, carrying the configured operation timeout.
    fn ldap(&mut self) -> &mut ldap3::Ldap {
        match self.options.operation_timeout {
            Some(timeout) => self.inner.with_timeout(timeout),
            None => &mut self.inner,
        }
    }
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.ldap()
            .simple_bind(dn, password)
            .await
            .and_then(ldap3::LdapResult::success)
            .map_err(map_ldap_error)?;
        Ok(())
    }

    #[cfg(feature = "gssapi")]
    async fn sasl_gssapi_bind(&mut self, server_fqdn: &str) -> Result<()> {
        self.ldap()
            .sasl_gssapi_bind(server_fqdn)
            .await
            .and_then(ldap3::LdapResult::success)
            .map_err(map_ldap_error)?;
        Ok(())
    }

    #[cfg(not(feature = "gssapi"))]
    async fn sasl_gssapi_bind(&mut self, _server_fqdn: &str) -> Result<()> {
        Err(Error::ConfigError(
            "kerberos authentication requires building with the `gssapi` feature".to_string(),
        ))
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<SearchItem>> {
        let attributes: Vec<&str> = if attributes.is_empty() {
            vec!["*"]
        } else {
            attributes.iter().map(String::as_str).collect()
        };
        let (entries, _) = self
            .ldap()
            .search(base, scope.into(), filter, attributes)
            .await
            .and_then(ldap3::SearchResult::success)
            .map_err(map_ldap_error)?;

        Ok(entries
            .into_iter()
            .filter(|entry| !entry.is_intermediate())
            .map(|entry| {
                if entry.is_ref() {
                    return SearchItem::Reference(ldap3::parse_refs(entry.0));
                }
                let entry = SearchEntry::construct(entry);
                if !entry.bin_attrs.is_empty() {
                    warn!(
                        dn = %entry.dn,
                        attributes = ?entry.bin_attrs.keys().collect::<Vec<_>>(),
                        "ignoring binary attribute values"
                    );
                }
                SearchItem::Entry(LdapEntry::new(entry.dn, entry.attrs.into_iter().collect()))
            })
            .collect())
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mods = modifications
            .iter()
            .map(|m| match m {
                DirectoryModification::Add { attribute, values } => Mod::Add(
                    attribute.as_str(),
                    values.iter().map(String::as_str).collect::<HashSet<_>>(),
                ),
                DirectoryModification::Delete { attribute, values } => Mod::Delete(
                    attribute.as_str(),
                    values.iter().map(String::as_str).collect::<HashSet<_>>(),
                ),
            })
            .collect::<Vec<_>>();

        self.ldap()
            .modify(dn, mods)
            .await
            .and_then(ldap3::LdapResult::success)
            .map_err(map_ldap_error)?;
        Ok(())
    }

    async fn add(&mut self, dn: &str, attributes: &[(String, Vec<String>)]) -> Result<()> {
        let attrs = attributes
            .iter()
            .map(|(attribute, values)| {
                (
                    attribute.as_str(),
                    values.iter().map(String::as_str).collect::<HashSet<_>>(),
                )
            })
            .collect::<Vec<_>>();

        self.ldap()
            .add(dn, attrs)
            .await
            .and_then(ldap3::LdapResult::success)
            .map_err(map_ldap_error)?;
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        self.ldap()
            .delete(dn)
            .await
            .and_then(ldap3::LdapResult::success)
            .map_err(map_ldap_error)?;
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.inner.unbind().await.map_err(map_ldap_error)
    }
}

fn build_ldap_settings(options: &ConnectionOptions) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_starttls(options.starttls);
    if let Some(timeout) = options.connect_timeout {
        settings = settings.set_conn_timeout(timeout);
    }

    if !options.tls_verify {
        warn!("TLS certificate verification disabled for directory connection");
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = &options.tls_ca_cert {
        debug!("loading directory CA certificate from {}", cert_path.display());
        let pem = fs::read(cert_path).map_err(|err| {
            Error::IoError(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::ConfigError(format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| Error::ConfigError(format!("failed to load CA certificate: {err}")))?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

/// LDAP result code for `noSuchObject`.
const RC_NO_SUCH_OBJECT: u32 = 32;
/// LDAP result code for `invalidCredentials`.
const RC_INVALID_CREDENTIALS: u32 = 49;
/// LDAP result code for `timeLimitExceeded`.
const RC_TIME_LIMIT_EXCEEDED: u32 = 3;

fn map_ldap_error(err: LdapError) -> Error {
    match err {
        LdapError::LdapResult { result } => match result.rc {
            RC_NO_SUCH_OBJECT => Error::NotFound(result.to_string()),
            RC_INVALID_CREDENTIALS => Error::AuthenticationError(result.to_string()),
            RC_TIME_LIMIT_EXCEEDED => Error::Timeout(result.to_string()),
            code => Error::DirectoryError {
                code,
                message: result.to_string(),
            },
        },
        LdapError::Timeout { .. } => Error::Timeout(err.to_string()),
        other => Error::ConnectionError(other.to_string()),
    }
}
