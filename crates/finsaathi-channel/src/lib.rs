// finsaathi-channel: method channel protocol and dispatch for the FinSaathi host
//
// The application layer calls host operations by name on a named channel and
// gets exactly one reply per call: a value, a structured error, or "not
// implemented". Transport-agnostic: the dispatcher is driven in-process (JNI)
// or over any async byte stream.

mod config;
mod dispatcher;
mod protocol;
mod registry;
mod transport;

pub use config::*;
pub use dispatcher::*;
pub use protocol::*;
pub use registry::*;
pub use transport::*;
