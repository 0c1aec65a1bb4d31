//! Use cases built on the domain: turning raw credit documents into a
//! ledger view, working out how credits pay down a bill, and driving a
//! payment session from start to receipt.

pub mod allocation;
pub mod ledger;
pub mod session;
