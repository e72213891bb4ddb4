//! Outbound dial string rewriting
//!
//! Each `[[dial-gateway]]` entry maps a URI prefix to an engine dial prefix.
//! The longest matching prefix wins; the `default` entry catches the rest.

use rayo_config::{DialGatewayConfig, DEFAULT_GATEWAY_PREFIX};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct DialGateways {
    entries: Vec<DialGatewayConfig>,
    fallback: Option<DialGatewayConfig>,
}

impl DialGateways {
    pub fn new(configs: &[DialGatewayConfig]) -> Self {
        let mut entries = Vec::new();
        let mut fallback = None;
        for config in configs {
            if config.uri_prefix == DEFAULT_GATEWAY_PREFIX {
                fallback = Some(config.clone());
            } else {
                entries.push(config.clone());
            }
        }
        // longest first, so the first hit is the best one
        entries.sort_by(|a, b| b.uri_prefix.len().cmp(&a.uri_prefix.len()));
        Self { entries, fallback }
    }

    /// Gateway entry that applies to `uri`
    pub fn lookup(&self, uri: &str) -> Option<&DialGatewayConfig> {
        self.entries
            .iter()
            .find(|entry| uri.starts_with(entry.uri_prefix.as_str()))
            .or(self.fallback.as_ref())
    }

    /// Dial string the engine should use for `uri`. Without any matching
    /// entry the URI is used unchanged.
    pub fn resolve(&self, uri: &str) -> String {
        match self.lookup(uri) {
            Some(gateway) => {
                let rest: String = uri.chars().skip(gateway.strip).collect();
                let dial_string = format!("{}{}", gateway.dial_prefix, rest);
                debug!(uri, prefix = %gateway.uri_prefix, dial_string = %dial_string, "Resolved dial string");
                dial_string
            }
            None => uri.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayo_config::GatewayConfig;

    fn defaults() -> DialGateways {
        DialGateways::new(&GatewayConfig::default().dial_gateways)
    }

    #[test]
    fn test_default_table() {
        let gateways = defaults();
        assert_eq!(gateways.resolve("tel:+15551234567"), "sofia/gateway/outbound/+15551234567");
        assert_eq!(gateways.resolve("user/1000"), "user/1000");
        assert_eq!(gateways.resolve("sofia/internal/1000@host"), "sofia/internal/1000@host");
        assert_eq!(
            gateways.resolve("sip:alice@example.com"),
            "sofia/gateway/outbound/sip:alice@example.com"
        );
    }

    #[test]
    fn test_longest_prefix_wins() {
        let gateways = DialGateways::new(&[
            DialGatewayConfig::new("sip:", "sofia/external/", 4),
            DialGatewayConfig::new("sip:+44", "sofia/gateway/uk/", 7),
        ]);
        assert_eq!(gateways.resolve("sip:+442071234567"), "sofia/gateway/uk/2071234567");
        assert_eq!(gateways.resolve("sip:bob@example.com"), "sofia/external/bob@example.com");
        // no default entry
        assert_eq!(gateways.resolve("tel:123"), "tel:123");
    }

    #[test]
    fn test_strip_longer_than_uri() {
        let gateways = DialGateways::new(&[DialGatewayConfig::new("tel:", "gw/", 10)]);
        assert_eq!(gateways.resolve("tel:12"), "gw/");
    }
}
