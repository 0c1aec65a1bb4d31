//! Domain types and the ports the core talks to the outside world through.

pub mod bill;
pub mod card;
pub mod credit;
pub mod ids;
pub mod money;
pub mod ports;
pub mod session;
