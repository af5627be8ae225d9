//! Debug Adapter Protocol surface: envelopes, framing and the session
//! dispatch loop.

pub mod args;
pub mod protocol;
pub mod session;
pub mod tracer;
pub mod transport;
