//! Directory entries as returned by searches.

use std::collections::BTreeMap;

/// LDAP entry: a distinguished name plus multi-valued attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map; values keep the order the server sent them in.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(dn: impl Into<String>, attributes: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// Returns the stored spelling of `attribute`, matched case-insensitively.
    #[must_use]
    pub fn attribute_key(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .keys()
            .find(|key| key.eq_ignore_ascii_case(attribute))
            .map(String::as_str)
    }

    /// Returns all values for the attribute (case-insensitive).
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attribute_key(attribute)
            .and_then(|key| self.attributes.get(key))
            .map(Vec::as_slice)
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }
}

/// One element of a raw search response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchItem {
    /// A real entry.
    Entry(LdapEntry),
    /// A search continuation reference: no DN, only follow-up URIs.
    Reference(Vec<String>),
}

impl SearchItem {
    /// Returns the entry, discarding references.
    #[must_use]
    pub fn into_entry(self) -> Option<LdapEntry> {
        match self {
            Self::Entry(entry) => Some(entry),
            Self::Reference(_) => None,
        }
    }
}
