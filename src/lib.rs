//! Abstract debugger core.
//!
//! The [`debugger`] module holds the stepping engine and its collaborators
//! (ARG model, oracle client, thread/frame store, breakpoints, variables).
//! The [`dap`] module maps the Debug Adapter Protocol onto the engine.

pub mod dap;
pub mod debugger;
