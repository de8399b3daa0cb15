//! Protocol-layer hooks used while draining an extension.

use async_trait::async_trait;

/// Gateway that owns the listeners for one protocol family.
///
/// The shutdown manager asks it to stop routing new traffic to an extension
/// and later to drop the connections that extension still holds.
#[async_trait]
pub trait ProtocolGateway: Send + Sync {
    /// Stop routing new requests/connections to `extension_id`.
    async fn stop_accepting(&self, extension_id: &str) -> anyhow::Result<()>;

    /// Drop whatever connections `extension_id` still holds.
    async fn close_all_connections(&self, extension_id: &str) -> anyhow::Result<()>;

    fn active_connection_count(&self, _extension_id: &str) -> u64 {
        0
    }
}
