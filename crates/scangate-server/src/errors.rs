//! Server error type.

use std::net::SocketAddr;

/// Errors raised while starting or running the HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configured host/port is not a socket address.
    #[error("invalid listen address {0}")]
    InvalidAddress(String),

    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_names_address() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:80".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("127.0.0.1:80"));
    }

    #[test]
    fn invalid_address_message() {
        let err = ServerError::InvalidAddress("nope:99999".into());
        assert_eq!(err.to_string(), "invalid listen address nope:99999");
    }
}
