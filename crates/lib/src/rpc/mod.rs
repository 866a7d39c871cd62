//! JSON-RPC plumbing for the signal-cli `jsonRpc` stdio protocol.
//!
//! One line per frame in both directions. Inbound frames are either notifications
//! (`receive`) or responses to our `getAttachment` requests, matched by request id.

mod correlation;
mod protocol;
mod transport;

pub use correlation::{CorrelationTable, PendingAttachment};
pub use protocol::{
    decode_frame, Frame, FrameError, RpcError, RpcRequest, JSONRPC_VERSION, METHOD_GET_ATTACHMENT,
    METHOD_RECEIVE,
};
pub use transport::{LineTransport, Transport, TransportError};
