//! The seam the fluidics engine uses to reach the broadcast engine's
//! immediate command queue without depending on a concrete serial
//! transport.

use async_trait::async_trait;
use rbc_protocol::Command;

/// Implemented by whatever owns the live `rbc_broadcast::BroadcastEngine`
/// for this process, so the fluidics engine can push an IPP-efflux or
/// prime command into the same queue a broadcast cycle drains.
#[async_trait]
pub trait ImmediateSink: Send + Sync {
    async fn push_immediate(&self, cmd: Command);
}
