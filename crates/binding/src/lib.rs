//! Contract bindings for the OP Stack contracts the monitor reads.
//!
//! All bindings are generated using alloy's `sol!` macro.

pub mod opstack;
