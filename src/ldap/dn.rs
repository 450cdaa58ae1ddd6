//! Distinguished name construction.

use crate::error::{IndexGateError, Result};

/// Turn a DNS domain into its `dc=` components, e.g. `example.com` becomes
/// `dc=example,dc=com`.
pub fn domain_to_dn(domain: &str) -> Result<String> {
    let parts: Vec<&str> = domain.split('.').collect();
    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(IndexGateError::InvalidConfig(format!(
            "wrong domain defined: '{}'",
            domain
        )));
    }

    Ok(parts
        .iter()
        .map(|p| format!("dc={}", p.trim()))
        .collect::<Vec<_>>()
        .join(","))
}

/// Build `attr=value,base` with `value` escaped as an RDN value (RFC 4514).
pub fn user_dn(attribute: &str, value: &str, base_dn: &str) -> String {
    if base_dn.is_empty() {
        format!("{}={}", attribute, escape_rdn_value(value))
    } else {
        format!("{}={},{}", attribute, escape_rdn_value(value), base_dn)
    }
}

/// Escape a value for use inside a DN component.
pub fn escape_rdn_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '#' if i == 0 => escaped.push_str("\\#"),
            ' ' if i == 0 || i == last => escaped.push_str("\\ "),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(c),
        }
    }
    escaped
}
