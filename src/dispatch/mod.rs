//! Protocol dispatchers.
//!
//! One module per protocol family. Each takes a classified request, finds
//! its handler in the registries and produces an `HttpResponse`.
//!
//! ```text
//! stream.rs   METHOD:path handlers, bytes written verbatim
//! generic.rs  path handlers over a flattened request bag
//! llsd.rs     structured-data handlers with XML/JSON negotiation
//! xmlrpc.rs   method-name handlers, faults on failure
//! poll.rs     long-poll queue and worker pool
//! ```

pub mod generic;
pub mod llsd;
pub mod poll;
pub mod stream;
pub mod xmlrpc;

pub use generic::GenericHttpHandler;
pub use llsd::LlsdHandler;
pub use poll::{PollEvents, PollServiceArgs, PollServiceManager};
pub use stream::{StreamHandler, StreamedRequestHandler};
pub use xmlrpc::XmlRpcMethod;
