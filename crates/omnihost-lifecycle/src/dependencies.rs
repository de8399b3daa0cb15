//! Constructor dependency resolution by protocol family.
//!
//! Each family has a fixed, ordered list of well-known keys. The values the
//! resolver returns for those keys become the positional constructor
//! arguments of every extension in that family.

use dashmap::DashMap;
use omnihost_core::types::ProtocolFamily;
use omnihost_extension_api::DependencyValue;
use tracing::{debug, warn};

/// Well-known dependency keys.
pub mod keys {
    pub const STATS_COLLECTOR: &str = "stats.collector";
    pub const HTTP_ROUTER: &str = "http.router";
    pub const HTTP_SERVER: &str = "http.server";
    pub const MQTT_BROKER: &str = "mqtt.broker";
    pub const MQTT_SESSION_STORE: &str = "mqtt.session_store";
    pub const TCP_SERVER: &str = "tcp.server";
    pub const TCP_CODEC_REGISTRY: &str = "tcp.codec_registry";
    pub const WEBSOCKET_SERVER: &str = "websocket.server";
    pub const WEBSOCKET_SESSIONS: &str = "websocket.session_registry";
    pub const CUSTOM_PROTOCOL_REGISTRY: &str = "custom.protocol_registry";
}

/// Looks up a collaborator by key.
pub trait DependencyResolver: Send + Sync {
    fn resolve(&self, key: &str) -> anyhow::Result<DependencyValue>;
}

/// Resolver backed by a fixed key -> value map.
#[derive(Default)]
pub struct StaticDependencyResolver {
    values: DashMap<String, DependencyValue>,
}

impl StaticDependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(self, key: impl Into<String>, value: impl Into<DependencyValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<DependencyValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl DependencyResolver for StaticDependencyResolver {
    fn resolve(&self, key: &str) -> anyhow::Result<DependencyValue> {
        self.values
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| anyhow::anyhow!("no dependency registered under '{}'", key))
    }
}

/// Ordered dependency keys for a family.
pub fn family_keys(family: ProtocolFamily) -> &'static [&'static str] {
    use keys::*;
    match family {
        ProtocolFamily::Http => &[HTTP_ROUTER, HTTP_SERVER, STATS_COLLECTOR],
        ProtocolFamily::Mqtt => &[MQTT_BROKER, MQTT_SESSION_STORE, STATS_COLLECTOR],
        ProtocolFamily::Tcp => &[TCP_SERVER, TCP_CODEC_REGISTRY, STATS_COLLECTOR],
        ProtocolFamily::WebSocket => &[WEBSOCKET_SERVER, WEBSOCKET_SESSIONS, STATS_COLLECTOR],
        ProtocolFamily::Custom => &[CUSTOM_PROTOCOL_REGISTRY, STATS_COLLECTOR],
        ProtocolFamily::Udp => &[],
    }
}

/// Resolves the constructor arguments for `extension_id`.
///
/// Ids outside the known families get no arguments. A key that fails to
/// resolve is passed as `Null`.
pub fn collect_dependencies(
    resolver: &dyn DependencyResolver,
    extension_id: &str,
) -> Vec<DependencyValue> {
    let Some(family) = ProtocolFamily::from_extension_id(extension_id) else {
        debug!(extension_id = %extension_id, "No protocol family, constructing without dependencies");
        return Vec::new();
    };

    family_keys(family)
        .iter()
        .map(|key| match resolver.resolve(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(extension_id = %extension_id, key = %key, error = %e, "Dependency unresolved, passing null");
                DependencyValue::Null
            }
        })
        .collect()
}
