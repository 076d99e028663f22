//! spigot: expose a single stdio JSON-RPC subprocess as a multi-client SSE
//! service.
//!
//! One subprocess, many clients: every client sees every message the child
//! emits, and every client's inbound messages land on the one shared child
//! stdin. The child never learns there is more than one caller.

pub mod api;
pub mod bridge;
pub mod config;
pub mod framing;
pub mod idle;
pub mod registry;
pub mod shutdown;
pub mod supervisor;
