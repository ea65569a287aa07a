//! Lifecycle entities, the state graph, and the ports the application layer
//! drives.

pub mod ledger;
pub mod ports;
pub mod status;
pub mod trace;
pub mod transaction;
pub mod transition;
