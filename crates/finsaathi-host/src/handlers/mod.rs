// Host operations exposed on the performance channel.
//
// Each handler is built around a collaborator trait so the host-specific work
// (and test doubles) stay outside the dispatch contract.

mod performance;
mod sign_in;

pub use performance::*;
pub use sign_in::*;
