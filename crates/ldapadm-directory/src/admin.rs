//! Administrative operations over configured item types.
//!
//! Every operation takes a batch of target names and returns one [`Outcome`] per name, in
//! input order. A failure for one name is recorded in its outcome and the batch carries on.

use crate::{
    dn::{DistinguishedName, RelativeDistinguishedName},
    filter,
    manager::{ObjectManager, NO_ATTRIBUTES},
    outcome::{Outcome, ResultRecord},
    session::SearchScope,
    Result,
};
use ldapadm_core::{ItemType, ToolConfig};
use tracing::{debug, error, warn};

/// Runs administrative operations against one bound directory connection.
pub struct AdminTool {
    config: ToolConfig,
    manager: ObjectManager,
}

impl AdminTool {
    /// Connects and binds using the configuration's connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`](ldapadm_core::Error::ConfigError) or
    /// [`Error::AuthenticationError`](ldapadm_core::Error::AuthenticationError) when no usable
    /// connection can be established. These are fatal for the whole invocation.
    pub async fn connect(config: ToolConfig) -> Result<Self> {
        let settings = config.connection_settings()?;
        let manager = ObjectManager::connect(&settings).await?;
        Ok(Self::new(config, manager))
    }

    /// Wraps an already connected object manager.
    #[must_use]
    pub fn new(config: ToolConfig, manager: ObjectManager) -> Self {
        Self { config, manager }
    }

    /// Unbinds the underlying connection.
    ///
    /// # Errors
    ///
    /// Propagates transport errors from the unbind.
    pub async fn close(self) -> Result<()> {
        self.manager.close().await
    }

    /// Looks up exactly one entry per name by its identifier attribute.
    pub async fn get(&mut self, item_type: &str, names: &[String]) -> Vec<Outcome> {
        self.run_batch(ItemOperation::Get, item_type, names).await
    }

    /// Prefix-searches the item type's search attributes for each term.
    ///
    /// A term matching nothing succeeds with no results.
    pub async fn search(&mut self, item_type: &str, terms: &[String]) -> Vec<Outcome> {
        self.run_batch(ItemOperation::Search, item_type, terms).await
    }

    /// Creates one entry per name from the item type's schema template.
    pub async fn create(&mut self, item_type: &str, names: &[String]) -> Vec<Outcome> {
        self.run_batch(ItemOperation::Create, item_type, names).await
    }

    /// Resolves each name to a DN and deletes that entry.
    pub async fn delete(&mut self, item_type: &str, names: &[String]) -> Vec<Outcome> {
        self.run_batch(ItemOperation::Delete, item_type, names).await
    }

    /// Adds each member's DN to the group's member attribute.
    ///
    /// The group is resolved once; if that fails every member fails with the same error.
    pub async fn insert(
        &mut self,
        group_type: &str,
        group_name: &str,
        member_type: &str,
        members: &[String],
    ) -> Vec<Outcome> {
        self.change_membership(Membership::Insert, group_type, group_name, member_type, members)
            .await
    }

    /// Removes each member's DN from the group's member attribute.
    pub async fn remove(
        &mut self,
        group_type: &str,
        group_name: &str,
        member_type: &str,
        members: &[String],
    ) -> Vec<Outcome> {
        self.change_membership(Membership::Remove, group_type, group_name, member_type, members)
            .await
    }

    async fn run_batch(
        &mut self,
        operation: ItemOperation,
        item_type: &str,
        names: &[String],
    ) -> Vec<Outcome> {
        let descriptor = self.config.item_type(item_type);
        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            let result = match &descriptor {
                Ok(descriptor) => match operation {
                    ItemOperation::Get => self.get_one(descriptor, name).await,
                    ItemOperation::Search => self.search_one(descriptor, name).await,
                    ItemOperation::Create => self.create_one(descriptor, name).await,
                    ItemOperation::Delete => self.delete_one(descriptor, name).await,
                },
                Err(err) => Err(err.clone()),
            };
            outcomes.push(finish(operation.as_str(), name, result));
        }
        outcomes
    }

    async fn get_one(&mut self, descriptor: &ItemType, name: &str) -> Result<Vec<ResultRecord>> {
        let filter = item_filter(descriptor, filter::equality(&descriptor.identifier, name));
        let entry = self
            .manager
            .get_single(&descriptor.base, &filter, SearchScope::Subtree, &descriptor.display)
            .await?;
        Ok(vec![ResultRecord::from_entry(entry, &descriptor.display)])
    }

    async fn search_one(&mut self, descriptor: &ItemType, term: &str) -> Result<Vec<ResultRecord>> {
        let filter = item_filter(
            descriptor,
            filter::prefix_search(&descriptor.search, &[term.to_string()]),
        );
        let entries = self
            .manager
            .get_multiple(&descriptor.base, &filter, SearchScope::Subtree, &descriptor.display)
            .await?;
        Ok(entries
            .into_iter()
            .map(|entry| ResultRecord::from_entry(entry, &descriptor.display))
            .collect())
    }

    async fn create_one(&mut self, descriptor: &ItemType, name: &str) -> Result<Vec<ResultRecord>> {
        let dn = DistinguishedName::parse(&descriptor.base)?
            .with_prefix(RelativeDistinguishedName::new(&descriptor.identifier, name));
        self.manager.create_object(dn.as_str(), &descriptor.schema).await?;
        Ok(vec![ResultRecord {
            dn: dn.into(),
            attributes: descriptor
                .schema
                .iter()
                .map(|(attribute, values)| (attribute.clone(), Some(values.clone())))
                .collect(),
        }])
    }

    async fn delete_one(&mut self, descriptor: &ItemType, name: &str) -> Result<Vec<ResultRecord>> {
        let dn = self.resolve_dn(descriptor, name).await?;
        self.manager.delete_object(&dn).await?;
        Ok(vec![ResultRecord {
            dn,
            attributes: Default::default(),
        }])
    }

    async fn change_membership(
        &mut self,
        change: Membership,
        group_type: &str,
        group_name: &str,
        member_type: &str,
        members: &[String],
    ) -> Vec<Outcome> {
        let group = match self.config.item_type(group_type) {
            Ok(descriptor) => self
                .resolve_dn(&descriptor, group_name)
                .await
                .map(|dn| (dn, descriptor.member)),
            Err(err) => Err(err),
        };
        if let Ok((dn, _)) = &group {
            debug!(group = %dn, "resolved group");
        }
        let member_descriptor = self.config.item_type(member_type);

        let mut outcomes = Vec::with_capacity(members.len());
        for member in members {
            let result = match (&group, &member_descriptor) {
                (Ok((group_dn, attribute)), Ok(descriptor)) => {
                    self.change_member(change, group_dn, attribute, descriptor, member)
                        .await
                }
                (Err(err), _) => Err(err.clone()),
                (_, Err(err)) => Err(err.clone()),
            };
            outcomes.push(finish(change.as_str(), member, result));
        }
        outcomes
    }

    async fn change_member(
        &mut self,
        change: Membership,
        group_dn: &str,
        attribute: &str,
        descriptor: &ItemType,
        member: &str,
    ) -> Result<Vec<ResultRecord>> {
        let member_dn = vec![self.resolve_dn(descriptor, member).await?];
        match change {
            Membership::Insert => {
                self.manager
                    .add_attribute(group_dn, attribute, &member_dn)
                    .await?;
            }
            Membership::Remove => {
                self.manager
                    .remove_attribute(group_dn, attribute, &member_dn)
                    .await?;
            }
        }
        Ok(vec![ResultRecord {
            dn: group_dn.to_string(),
            attributes: [(attribute.to_string(), Some(member_dn))].into_iter().collect(),
        }])
    }

    /// Resolves a name to exactly one DN, requesting no attributes.
    async fn resolve_dn(&mut self, descriptor: &ItemType, name: &str) -> Result<String> {
        let filter = item_filter(descriptor, filter::equality(&descriptor.identifier, name));
        let entry = self
            .manager
            .get_single(
                &descriptor.base,
                &filter,
                SearchScope::Subtree,
                &[NO_ATTRIBUTES.to_string()],
            )
            .await?;
        Ok(entry.dn)
    }
}

#[derive(Debug, Clone, Copy)]
enum ItemOperation {
    Get,
    Search,
    Create,
    Delete,
}

impl ItemOperation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Search => "search",
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Membership {
    Insert,
    Remove,
}

impl Membership {
    fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Remove => "remove",
        }
    }
}

/// Combines a per-name filter with the item type's own filter.
fn item_filter(descriptor: &ItemType, name_filter: String) -> String {
    match &descriptor.filter {
        Some(type_filter) => filter::and(&[name_filter, type_filter.clone()]),
        None => filter::parenthesize(&name_filter),
    }
}

fn finish(operation: &str, target: &str, result: Result<Vec<ResultRecord>>) -> Outcome {
    if let Err(err) = &result {
        if err.should_log() {
            error!(operation, target, code = err.error_code(), error = %err, "operation failed");
        } else {
            warn!(operation, target, code = err.error_code(), error = %err, "operation failed");
        }
    }
    Outcome::from_result(target, result)
}
