//! Wire codecs for the structured request protocols.
//!
//! Pure serialize/deserialize functions with no knowledge of routing:
//! ```text
//! request body ──▶ xml.rs (element tree) ──▶ xmlrpc.rs / llsd.rs ──▶ typed value
//! typed value  ──▶ xmlrpc.rs / llsd.rs ──▶ response body
//! ```

pub mod llsd;
pub mod xml;
pub mod xmlrpc;

pub use llsd::{LlsdEncoding, LlsdError, LlsdValue};
pub use xmlrpc::{XmlRpcError, XmlRpcRequest, XmlRpcResponse, XmlRpcValue};
