//! Protocol namespaces

/// Core call control commands and events
pub const RAYO: &str = "urn:xmpp:rayo:1";
/// Component extension commands (stop, etc.)
pub const RAYO_EXT: &str = "urn:xmpp:rayo:ext:1";
/// Component completion wrapper
pub const RAYO_COMPLETE: &str = "urn:xmpp:rayo:ext:complete:1";
pub const OUTPUT: &str = "urn:xmpp:rayo:output:1";
pub const OUTPUT_COMPLETE: &str = "urn:xmpp:rayo:output:complete:1";
pub const INPUT: &str = "urn:xmpp:rayo:input:1";
pub const INPUT_COMPLETE: &str = "urn:xmpp:rayo:input:complete:1";
pub const PROMPT: &str = "urn:xmpp:rayo:prompt:1";
pub const RECORD: &str = "urn:xmpp:rayo:record:1";
pub const RECORD_COMPLETE: &str = "urn:xmpp:rayo:record:complete:1";
pub const PING: &str = "urn:xmpp:ping";
/// Service discovery
pub const DISCO_INFO: &str = "http://jabber.org/protocol/disco#info";
pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

/// Engine notifications injected by the gateway. Never seen on the wire.
pub const ENGINE: &str = "urn:x-rayo-gateway:engine:1";
/// Actor-to-actor notifications that never leave the process.
pub const INTERNAL: &str = "urn:x-rayo-gateway:internal:1";
