//! Per-target results of administrative operations.

use crate::{entry::LdapEntry, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// One entry as reported to the caller.
///
/// Display attributes the entry does not carry are present with a `None` value, so every
/// record of an item type has the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRecord {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute values; `None` marks a display attribute the entry lacks.
    pub attributes: BTreeMap<String, Option<Vec<String>>>,
}

impl ResultRecord {
    /// Builds a record from a directory entry, filling absent `display` attributes.
    #[must_use]
    pub fn from_entry(entry: LdapEntry, display: &[String]) -> Self {
        let mut attributes: BTreeMap<String, Option<Vec<String>>> = BTreeMap::new();
        for wanted in display {
            if entry.attribute_key(wanted).is_none() {
                attributes.insert(wanted.clone(), None);
            }
        }
        attributes.extend(
            entry
                .attributes
                .into_iter()
                .map(|(attribute, values)| (attribute, Some(values))),
        );

        Self {
            dn: entry.dn,
            attributes,
        }
    }
}

/// Outcome for a single target name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Name the operator asked for.
    pub target: String,
    /// Whether the operation succeeded for this target.
    pub success: bool,
    /// Diagnostic message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Entries produced by the operation.
    pub results: Vec<ResultRecord>,
}

impl Outcome {
    /// Successful outcome carrying `results`.
    #[must_use]
    pub fn succeeded(target: impl Into<String>, results: Vec<ResultRecord>) -> Self {
        Self {
            target: target.into(),
            success: true,
            message: None,
            results,
        }
    }

    /// Failed outcome with a diagnostic message.
    #[must_use]
    pub fn failed(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            success: false,
            message: Some(message.into()),
            results: Vec::new(),
        }
    }

    /// Records the result of one target's operation.
    #[must_use]
    pub fn from_result(target: impl Into<String>, result: Result<Vec<ResultRecord>>) -> Self {
        match result {
            Ok(results) => Self::succeeded(target, results),
            Err(err) => Self::failed(target, err.to_string()),
        }
    }
}

/// True when no outcome failed.
#[must_use]
pub fn all_succeeded(outcomes: &[Outcome]) -> bool {
    outcomes.iter().all(|outcome| outcome.success)
}
