//! Directory access for the ldapadm administration tool.
//!
//! The crate is layered: a connection layer opens and binds a single `ldap3`
//! connection, the [`ObjectManager`] turns it into safe lookup and mutation primitives,
//! and the [`AdminTool`] composes those primitives per configured item type.

#![deny(missing_docs)]

mod admin;
mod dn;
mod entry;
pub mod filter;
mod manager;
mod modify;
mod options;
mod outcome;
mod session;

pub use admin::AdminTool;
pub use dn::{DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use entry::{LdapEntry, SearchItem};
pub use manager::{ObjectManager, NO_ATTRIBUTES};
pub use modify::{modify_diff, DirectoryModification};
pub use options::ConnectionOptions;
pub use outcome::{all_succeeded, Outcome, ResultRecord};
pub use session::SearchScope;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = ldapadm_core::Result<T>;
