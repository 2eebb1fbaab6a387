/// A room or master endpoint couldn't move bytes.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listen address couldn't be bound.
    #[error("cannot listen on {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A TCP accept or the WebSocket upgrade after it failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}
