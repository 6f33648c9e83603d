//! Read-only analyses over a populated flow table: RTT estimation and
//! top-flow selection. Nothing here mutates a flow.

pub mod rtt;
pub mod top;
