//! # Rayo Gateway Configuration
//!
//! Loads the gateway settings from a TOML file, applies `RAYO__`-prefixed
//! environment overrides and validates the result before anything starts.
//!
//! ## Sections
//!
//! - **`[domain]`**: the domain every call and mixer address is created under
//! - **`[settings]`**: worker count, queue capacity, idle call timeout, mixer profile
//! - **`[[dial-gateway]]`**: how outbound dial strings are rewritten by URI prefix
//!
//! ## Usage
//!
//! ```rust
//! use rayo_config::GatewayConfig;
//!
//! let config = GatewayConfig::from_toml_str(
//!     r#"
//! [domain]
//! name = "rayo.example.com"
//!
//! [settings]
//! message-threads = 4
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.settings.message_threads, 4);
//! assert_eq!(config.settings.queue_capacity, 25_000);
//! assert_eq!(config.dial_gateways.len(), 4);
//! ```

pub mod gateway_config;

pub use gateway_config::{
    load_config, DialGatewayConfig, DomainConfig, GatewayConfig, Settings, DEFAULT_GATEWAY_PREFIX,
    ENV_PREFIX,
};
