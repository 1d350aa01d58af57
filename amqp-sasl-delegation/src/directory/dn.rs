//! Distinguished name templates for simple binds

use std::{fmt, str::FromStr};

const PLACEHOLDER: &str = "%s";

/// A DN with exactly one `%s` placeholder for the username, e.g. `uid=%s,ou=people,dc=example,dc=com`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnTemplate {
    prefix: String,
    suffix: String,
}

/// The template does not contain exactly one placeholder
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("DN template {0:?} must contain exactly one %s")]
pub struct DnTemplateError(pub String);

impl DnTemplate {
    /// Parses a template
    pub fn new(template: &str) -> Result<Self, DnTemplateError> {
        match template.split_once(PLACEHOLDER) {
            Some((prefix, suffix)) if !suffix.contains(PLACEHOLDER) => Ok(Self {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            }),
            _ => Err(DnTemplateError(template.to_string())),
        }
    }

    /// The DN for `username`, escaped so that it stays a single attribute value
    pub fn format(&self, username: &str) -> String {
        let mut dn = String::with_capacity(self.prefix.len() + username.len() + self.suffix.len());
        dn.push_str(&self.prefix);
        escape_attribute_value(username, &mut dn);
        dn.push_str(&self.suffix);
        dn
    }
}

impl FromStr for DnTemplate {
    type Err = DnTemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for DnTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, PLACEHOLDER, self.suffix)
    }
}

/// RFC 4514 section 2.4
fn escape_attribute_value(value: &str, out: &mut String) {
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        match c {
            '"' | '+' | ',' | ';' | '<' | '>' | '\\' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '#' if i == 0 => out.push_str("\\#"),
            ' ' if i == 0 || i == last => out.push_str("\\ "),
            '\0' => out.push_str("\\00"),
            c => out.push(c),
        }
    }
}
