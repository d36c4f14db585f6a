//! Error types for the transfer core
//!
//! Errors fall into three groups that callers treat differently:
//!
//! - **Transport**: connect/send failures. The current operation is aborted,
//!   nothing is retried automatically.
//! - **Crypto**: malformed keys, missing keys, failed authentication. The
//!   offending message is discarded; the connection stays open.
//! - **User-correctable**: dialing a peer twice or an unreachable peer id.
//!
//! None of them is fatal to the process; the session manager reports them as
//! discrete events.
//!
//! # Example
//!
//! ```
//! use wisp_core::NodeError;
//!
//! fn report(err: &NodeError) -> &'static str {
//!     if err.is_user_correctable() {
//!         "check the peer id"
//!     } else if err.is_crypto() {
//!         "message discarded"
//!     } else {
//!         "operation aborted"
//!     }
//! }
//!
//! assert_eq!(report(&NodeError::AlreadyConnected("bob".into())), "check the peer id");
//! ```

use std::borrow::Cow;
use thiserror::Error;
use wisp_crypto::CryptoError;
use wisp_files::FilesError;
use wisp_transport::TransportError;

/// Errors that can occur in session and transfer operations
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    // ============ Session Errors ============
    /// Opening the local session failed
    #[error("Session start failed: {0}")]
    SessionStart(Cow<'static, str>),

    /// Operation needs a started session
    #[error("Session not started")]
    NotStarted,

    /// A live or in-progress connection to the peer already exists
    #[error("Already connected to peer {0}")]
    AlreadyConnected(String),

    /// The peer identifier cannot be reached
    #[error("Peer unavailable: {0}")]
    PeerUnavailable(String),

    /// Connection establishment failed for any other reason
    #[error("Connection failed: {0}")]
    ConnectionFailed(Cow<'static, str>),

    /// The connection closed while sending
    #[error("Connection to peer {0} lost")]
    ConnectionLost(String),

    /// No connection to the peer
    #[error("Not connected to peer {0}")]
    NotConnected(String),

    // ============ Cryptographic Errors ============
    /// Received key material has the wrong shape
    #[error("Invalid key format: {0}")]
    KeyFormat(Cow<'static, str>),

    /// No key stored for the sending peer
    #[error("No key for peer {0}")]
    MissingKey(String),

    /// Ciphertext failed authentication (tampered, wrong key or wrong nonce)
    #[error("Authentication failed for transfer from peer {0}")]
    Authentication(String),

    /// Other cryptographic failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    // ============ Transfer Errors ============
    /// Assembly found an index that was never delivered
    #[error("Missing chunk {index} in transfer {transfer_id}")]
    MissingChunk {
        /// Transfer id
        transfer_id: String,
        /// First missing index
        index: u64,
    },

    /// No in-flight transfer with this id
    #[error("Unknown transfer: {0}")]
    UnknownTransfer(String),

    // ============ Configuration & State Errors ============
    /// Message encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(Cow<'static, str>),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// Invalid state transition
    #[error("Invalid state: {0}")]
    InvalidState(Cow<'static, str>),

    /// Task join error
    #[error("Task join error: {0}")]
    TaskJoin(Cow<'static, str>),
}

impl NodeError {
    /// Returns true if this error came from establishing or using a connection
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            NodeError::SessionStart(_)
                | NodeError::PeerUnavailable(_)
                | NodeError::ConnectionFailed(_)
                | NodeError::ConnectionLost(_)
                | NodeError::NotConnected(_)
        )
    }

    /// Returns true if this error is a per-message crypto failure
    ///
    /// The message is discarded; the connection stays open.
    #[must_use]
    pub fn is_crypto(&self) -> bool {
        matches!(
            self,
            NodeError::KeyFormat(_)
                | NodeError::MissingKey(_)
                | NodeError::Authentication(_)
                | NodeError::Crypto(_)
        )
    }

    /// Returns true if the user can fix this by choosing a different peer or
    /// action
    #[must_use]
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            NodeError::AlreadyConnected(_) | NodeError::PeerUnavailable(_) | NodeError::NotStarted
        )
    }

    /// Create an invalid state error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_state(context: &'static str) -> Self {
        NodeError::InvalidState(Cow::Borrowed(context))
    }

    /// Create an invalid config error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        NodeError::InvalidConfig(Cow::Borrowed(context))
    }

    /// Create a connection failure with static context (zero allocation)
    #[must_use]
    pub const fn connection_failed(context: &'static str) -> Self {
        NodeError::ConnectionFailed(Cow::Borrowed(context))
    }

    /// Map a crypto error raised while handling a message from `peer`
    ///
    /// Authentication failures keep the peer in the error so the caller can
    /// tell which connection delivered the bad payload.
    #[must_use]
    pub fn from_crypto(err: CryptoError, peer: &str) -> Self {
        if err.is_authentication() {
            NodeError::Authentication(peer.to_string())
        } else if err.is_key_format() {
            NodeError::KeyFormat(Cow::Owned(err.to_string()))
        } else {
            NodeError::Crypto(err.to_string())
        }
    }
}

impl From<CryptoError> for NodeError {
    fn from(err: CryptoError) -> Self {
        if err.is_key_format() {
            NodeError::KeyFormat(Cow::Owned(err.to_string()))
        } else {
            NodeError::Crypto(err.to_string())
        }
    }
}

impl From<FilesError> for NodeError {
    fn from(err: FilesError) -> Self {
        match err {
            FilesError::UnknownTransfer(id) => NodeError::UnknownTransfer(id),
            FilesError::MissingChunk { transfer_id, index } => {
                NodeError::MissingChunk { transfer_id, index }
            }
            FilesError::InvalidChunkCount(_) => NodeError::InvalidState(Cow::Owned(err.to_string())),
        }
    }
}

impl From<TransportError> for NodeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::PeerUnavailable(peer) => NodeError::PeerUnavailable(peer),
            TransportError::BindFailed(reason) => NodeError::SessionStart(Cow::Owned(reason)),
            other => NodeError::ConnectionFailed(Cow::Owned(other.to_string())),
        }
    }
}

impl From<tokio::task::JoinError> for NodeError {
    fn from(err: tokio::task::JoinError) -> Self {
        NodeError::TaskJoin(Cow::Owned(err.to_string()))
    }
}

impl From<bincode::Error> for NodeError {
    fn from(err: bincode::Error) -> Self {
        NodeError::Serialization(Cow::Owned(err.to_string()))
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, NodeError>;
