//! Modification requests and attribute-level diffs.

use std::collections::BTreeMap;

/// LDAP modification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Add attribute values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Delete attribute values.
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete (empty removes attribute).
        values: Vec<String>,
    },
}

/// Computes the modifications that turn `old` into `new`.
///
/// Changes are expressed per value: values only in `new` are added, values only in `old`
/// are deleted, and an attribute whose new value list is empty (or that is missing from
/// `new`) is deleted outright. Deletions come before additions for the same attribute.
#[must_use]
pub fn modify_diff(
    old: &BTreeMap<String, Vec<String>>,
    new: &BTreeMap<String, Vec<String>>,
) -> Vec<DirectoryModification> {
    let mut modifications = Vec::new();

    for (attribute, new_values) in new {
        let old_values = old.get(attribute).map_or(&[][..], Vec::as_slice);

        if new_values.is_empty() {
            if !old_values.is_empty() {
                modifications.push(DirectoryModification::Delete {
                    attribute: attribute.clone(),
                    values: Vec::new(),
                });
            }
            continue;
        }

        let removed = difference(old_values, new_values);
        let added = difference(new_values, old_values);
        if !removed.is_empty() {
            modifications.push(DirectoryModification::Delete {
                attribute: attribute.clone(),
                values: removed,
            });
        }
        if !added.is_empty() {
            modifications.push(DirectoryModification::Add {
                attribute: attribute.clone(),
                values: added,
            });
        }
    }

    for (attribute, old_values) in old {
        if !new.contains_key(attribute) && !old_values.is_empty() {
            modifications.push(DirectoryModification::Delete {
                attribute: attribute.clone(),
                values: Vec::new(),
            });
        }
    }

    modifications
}

/// Multiset difference `left - right`, preserving the order of `left`.
fn difference(left: &[String], right: &[String]) -> Vec<String> {
    let mut remaining: Vec<&String> = right.iter().collect();
    left.iter()
        .filter(|value| match remaining.iter().position(|other| other == value) {
            Some(idx) => {
                remaining.swap_remove(idx);
                false
            }
            None => true,
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(attribute, values)| {
                (
                    (*attribute).to_string(),
                    values.iter().map(ToString::to_string).collect(),
                )
            })
            .collect()
    }

    /// Applies modifications the way a directory server would.
    fn apply(
        entry: &BTreeMap<String, Vec<String>>,
        modifications: &[DirectoryModification],
    ) -> BTreeMap<String, Vec<String>> {
        let mut entry = entry.clone();
        for modification in modifications {
            match modification {
                DirectoryModification::Add { attribute, values } => {
                    entry
                        .entry(attribute.clone())
                        .or_default()
                        .extend(values.iter().cloned());
                }
                DirectoryModification::Delete { attribute, values } if values.is_empty() => {
                    entry.remove(attribute);
                }
                DirectoryModification::Delete { attribute, values } => {
                    let current = entry.entry(attribute.clone()).or_default();
                    current.retain(|value| !values.contains(value));
                    if current.is_empty() {
                        entry.remove(attribute);
                    }
                }
            }
        }
        entry
    }

    #[test]
    fn new_attribute_is_added() {
        let old = attrs(&[]);
        let new = attrs(&[("member", &["uid=alice,dc=test"])]);
        assert_eq!(
            modify_diff(&old, &new),
            vec![DirectoryModification::Add {
                attribute: "member".to_string(),
                values: vec!["uid=alice,dc=test".to_string()],
            }]
        );
    }

    #[test]
    fn appended_value_is_added_alone() {
        let old = attrs(&[("awesome list", &["item 1"])]);
        let new = attrs(&[("awesome list", &["item 1", "item 2"])]);
        assert_eq!(
            modify_diff(&old, &new),
            vec![DirectoryModification::Add {
                attribute: "awesome list".to_string(),
                values: vec!["item 2".to_string()],
            }]
        );
    }

    #[test]
    fn removed_value_is_deleted_alone() {
        let old = attrs(&[("awesome list", &["item 1", "item 2"])]);
        let new = attrs(&[("awesome list", &["item 1"])]);
        assert_eq!(
            modify_diff(&old, &new),
            vec![DirectoryModification::Delete {
                attribute: "awesome list".to_string(),
                values: vec!["item 2".to_string()],
            }]
        );
    }

    #[test]
    fn emptied_or_missing_attribute_is_deleted() {
        let old = attrs(&[("member", &["a"]), ("description", &["x"])]);
        let new = attrs(&[("member", &[])]);
        assert_eq!(
            modify_diff(&old, &new),
            vec![
                DirectoryModification::Delete {
                    attribute: "member".to_string(),
                    values: Vec::new(),
                },
                DirectoryModification::Delete {
                    attribute: "description".to_string(),
                    values: Vec::new(),
                },
            ]
        );
    }

    #[test]
    fn identical_entries_produce_no_modifications() {
        let entry = attrs(&[("cn", &["admins"]), ("member", &["a", "b"])]);
        assert!(modify_diff(&entry, &entry).is_empty());
    }

    #[test]
    fn duplicates_follow_list_semantics() {
        let old = attrs(&[("tag", &["x"])]);
        let new = attrs(&[("tag", &["x", "x"])]);
        assert_eq!(
            modify_diff(&old, &new),
            vec![DirectoryModification::Add {
                attribute: "tag".to_string(),
                values: vec!["x".to_string()],
            }]
        );
    }

    #[test]
    fn add_then_remove_round_trips() {
        let starts: [&[&str]; 3] = [&[], &["uid=bob,dc=test"], &["uid=bob,dc=test", "uid=carol,dc=test"]];
        for start in starts {
            let original = if start.is_empty() {
                attrs(&[])
            } else {
                attrs(&[("member", start)])
            };

            let mut added = original.clone();
            added
                .entry("member".to_string())
                .or_default()
                .push("uid=alice,dc=test".to_string());
            let after_add = apply(&original, &modify_diff(&original, &added));
            assert_eq!(after_add, added);

            let mut removed = after_add.clone();
            let members = removed.get_mut("member").unwrap();
            let idx = members.iter().position(|m| m == "uid=alice,dc=test").unwrap();
            members.remove(idx);
            let after_remove = apply(&after_add, &modify_diff(&after_add, &removed));
            assert_eq!(after_remove, original);
        }
    }
}
