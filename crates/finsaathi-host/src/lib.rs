// finsaathi-host: native host side of the FinSaathi app
//
// Owns the host operations exposed to the application layer and the
// composition root that wires them onto the performance channel.

pub mod config;
pub mod daemon;
pub mod handlers;
pub mod shell;
