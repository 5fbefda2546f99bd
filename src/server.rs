//! Composes the router with zero or more bound transports and owns their
//! lifecycle: wire up listeners, log that they're up, hand back control to
//! the caller.

use std::sync::Arc;

use crate::router::Router;
use crate::transport::Transport;

pub struct Server {
    router: Arc<Router>,
    transports: Vec<Arc<dyn Transport>>,
}

impl Server {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            transports: Vec::new(),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    /// Start every registered transport against the shared router.
    pub async fn start(&self) -> anyhow::Result<()> {
        for transport in &self.transports {
            transport.start(self.router.clone()).await?;
        }
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        for transport in &self.transports {
            transport.stop().await?;
        }
        Ok(())
    }
}
