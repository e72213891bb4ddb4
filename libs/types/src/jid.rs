//! Protocol addresses of the form `node@domain/resource`

use crate::error::JidError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parsed protocol address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Jid {
    node: Option<String>,
    domain: String,
    resource: Option<String>,
}

impl Jid {
    pub fn new(node: Option<&str>, domain: &str, resource: Option<&str>) -> Self {
        Self {
            node: node.map(str::to_string),
            domain: domain.to_string(),
            resource: resource.map(str::to_string),
        }
    }

    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Address without the resource part
    pub fn bare(&self) -> String {
        match &self.node {
            Some(node) => format!("{}@{}", node, self.domain),
            None => self.domain.clone(),
        }
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(JidError::Empty);
        }
        let (bare, resource) = match s.split_once('/') {
            Some((bare, resource)) => (bare, Some(resource)),
            None => (s, None),
        };
        let (node, domain) = match bare.split_once('@') {
            Some(("", _)) => return Err(JidError::EmptyNode(s.to_string())),
            Some((node, domain)) => (Some(node), domain),
            None => (None, bare),
        };
        if domain.is_empty() {
            return Err(JidError::MissingDomain(s.to_string()));
        }
        Ok(Jid::new(node, domain, resource.filter(|r| !r.is_empty())))
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(node) = &self.node {
            write!(f, "{}@", node)?;
        }
        f.write_str(&self.domain)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{}", resource)?;
        }
        Ok(())
    }
}

/// Domain part of a raw address, without parsing it fully.
pub fn domain_of(address: &str) -> Option<&str> {
    let bare = bare_of(address);
    let domain = match bare.rsplit_once('@') {
        Some((_, domain)) => domain,
        None => bare,
    };
    (!domain.is_empty()).then_some(domain)
}

/// Raw address with the resource stripped.
pub fn bare_of(address: &str) -> &str {
    match address.split_once('/') {
        Some((bare, _)) => bare,
        None => address,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_address() {
        let jid: Jid = "alice@example.com/phone".parse().unwrap();
        assert_eq!(jid.node(), Some("alice"));
        assert_eq!(jid.domain(), "example.com");
        assert_eq!(jid.resource(), Some("phone"));
        assert_eq!(jid.bare(), "alice@example.com");
        assert_eq!(jid.to_string(), "alice@example.com/phone");
    }

    #[test]
    fn test_component_address_keeps_nested_resource() {
        let jid: Jid = "call@example.com/prompt-1".parse().unwrap();
        assert_eq!(jid.resource(), Some("prompt-1"));
        assert_eq!(jid.bare(), "call@example.com");
    }

    #[test]
    fn test_domain_only() {
        let jid: Jid = "example.com".parse().unwrap();
        assert_eq!(jid.node(), None);
        assert_eq!(jid.bare(), "example.com");
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!("".parse::<Jid>(), Err(JidError::Empty));
        assert!(matches!("@example.com".parse::<Jid>(), Err(JidError::EmptyNode(_))));
        assert!(matches!("alice@".parse::<Jid>(), Err(JidError::MissingDomain(_))));
    }

    #[test]
    fn test_raw_helpers() {
        assert_eq!(domain_of("alice@example.com/phone"), Some("example.com"));
        assert_eq!(domain_of("example.com"), Some("example.com"));
        assert_eq!(domain_of("alice@"), None);
        assert_eq!(bare_of("call@example.com/output-2"), "call@example.com");
    }

    proptest::proptest! {
        #[test]
        fn test_parsed_parts_agree_with_raw_helpers(
            node in "[a-z0-9]{1,8}",
            domain in "[a-z]{1,8}(\\.[a-z]{2,3})?",
            resource in proptest::option::of("[a-z0-9/-]{1,12}"),
        ) {
            let address = match &resource {
                Some(resource) => format!("{}@{}/{}", node, domain, resource),
                None => format!("{}@{}", node, domain),
            };
            let jid: Jid = address.parse().unwrap();
            proptest::prop_assert_eq!(jid.bare(), bare_of(&address));
            proptest::prop_assert_eq!(Some(jid.domain()), domain_of(&address));
            proptest::prop_assert_eq!(jid.resource(), resource.as_deref());
            proptest::prop_assert_eq!(jid.to_string(), address);
        }
    }
}
