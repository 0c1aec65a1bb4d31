//! Adapters for the domain ports: in-memory stores, the simulated gateway,
//! clocks and a logging notifier.

pub mod clock;
pub mod gateway;
pub mod in_memory;
pub mod notify;
