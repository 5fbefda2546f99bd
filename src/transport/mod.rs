//! Transport adapter contract: anything that can accept connections and
//! turn them into dispatches against a bound `Router`.

pub mod http;
pub mod p2p;

use std::sync::Arc;

use async_trait::async_trait;

use crate::router::Router;

/// Lifecycle shared by every concrete transport. `start`/`stop` are
/// idempotent; `is_running` is observable from any thread. Multiple
/// transport instances may be bound to the same router concurrently.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn start(&self, router: Arc<Router>) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
    fn is_running(&self) -> bool;
}
