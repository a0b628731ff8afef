//! Admin HTTP surface.
//!
//! Status snapshot, manual backend reset, forced network check, and cache and
//! queue inspection/clearing. Inputs are plain scalars (path segments, query
//! flags); outputs are the core's data structures as JSON.

pub mod handlers;
pub mod server;

pub use handlers::router;
pub use server::AdminServer;
