//! Transport to the CRI runtime service.
//!
//! containerd, CRI-O and cri-dockerd all serve `runtime.v1.RuntimeService` on a local
//! unix socket rather than TCP, so tonic is given a connector that dials that socket.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{pin, task};

use hyper_util::rt::TokioIo;
use tonic::transport::{Channel, Endpoint};

/// Upper bound for one `ListPodSandbox` or `ListContainers` call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects every HTTP/2 connection of the channel to the CRI socket.
#[derive(Debug, Clone)]
struct CriSocketConnector {
    socket: PathBuf,
}

impl tower::Service<hyper::Uri> for CriSocketConnector {
    type Response = TokioIo<tokio::net::UnixStream>;

    type Error = std::io::Error;

    type Future = pin::Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut task::Context<'_>) -> task::Poll<Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _uri: hyper::Uri) -> Self::Future {
        let socket = self.socket.clone();
        Box::pin(async move {
            log::trace!("Connecting to CRI socket {}", socket.display());
            let stream = tokio::net::UnixStream::connect(socket).await?;

            Ok(TokioIo::new(stream))
        })
    }
}

/// Creates the channel used by the CRI runtime client.
///
/// Nothing is dialed until the first discovery. A runtime that is not up yet, or that
/// restarts, only fails the passes that run while it is away.
pub fn cri_channel(socket: impl AsRef<Path>) -> Channel {
    let socket = socket.as_ref();
    log::debug!("Using CRI socket {}", socket.display());
    let connector = CriSocketConnector {
        socket: socket.to_path_buf(),
    };

    // the authority is ignored by the connector but required by the endpoint
    Endpoint::from_static("http://[::]:50051")
        .timeout(REQUEST_TIMEOUT)
        .connect_with_connector_lazy(connector)
}
