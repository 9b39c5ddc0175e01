//! LDAP search filter construction.
//!
//! Values supplied by operators are escaped per RFC 4515 before being embedded, so a name
//! like `a*)(uid=*` matches literally instead of widening the query.

/// Escapes a value for use inside a filter assertion.
#[must_use]
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Wraps a filter in parentheses unless it already is.
#[must_use]
pub fn parenthesize(filter: &str) -> String {
    let filter = filter.trim();
    if filter.starts_with('(') && filter.ends_with(')') {
        filter.to_string()
    } else {
        format!("({filter})")
    }
}

/// Equality assertion `(attribute=value)` with the value escaped.
#[must_use]
pub fn equality(attribute: &str, value: &str) -> String {
    format!("({attribute}={})", escape_value(value))
}

/// Prefix assertion `(attribute=value*)` with the value escaped.
#[must_use]
pub fn prefix(attribute: &str, value: &str) -> String {
    format!("({attribute}={}*)", escape_value(value))
}

/// Joins filters under a single `operator` (`&` or `|`).
///
/// No filters yields an empty string; a single filter is returned without an outer
/// operator.
#[must_use]
pub fn join(operator: char, filters: &[String]) -> String {
    match filters {
        [] => String::new(),
        [single] => parenthesize(single),
        many => {
            let body: String = many.iter().map(String::as_str).map(parenthesize).collect();
            format!("({operator}{body})")
        }
    }
}

/// Joins filters with AND.
#[must_use]
pub fn and(filters: &[String]) -> String {
    join('&', filters)
}

/// Joins filters with OR.
#[must_use]
pub fn or(filters: &[String]) -> String {
    join('|', filters)
}

/// OR of prefix assertions over every term and attribute, terms outermost.
#[must_use]
pub fn prefix_search(attributes: &[String], terms: &[String]) -> String {
    let clauses: Vec<String> = terms
        .iter()
        .flat_map(|term| attributes.iter().map(move |attribute| prefix(attribute, term)))
        .collect();
    or(&clauses)
}
