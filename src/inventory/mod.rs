//! Discovery of the containers running on the node.

mod cri;
mod grpc;

pub use cri::CriInventory;

use crate::container::DiscoveredContainer;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{method} request to container runtime failed: {source}")]
    Rpc {
        method: &'static str,
        #[source]
        source: Box<tonic::Status>,
    },
    #[error("invalid container id from container runtime: {0}")]
    InvalidContainerId(#[from] crate::container::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Source of the running containers to collect metrics for.
pub trait Inventory {
    /// Returns the running containers of ready pods that pass the configured filters,
    /// in a stable order.
    fn discover_containers(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<DiscoveredContainer>>> + Send;
}
