// rtb-common - Wire vocabulary for the Remote Token Bucket protocol
//
// Shared by the blocking and async clients so both frame, encode and
// classify messages through the same code.

pub mod codec;
pub mod command;
pub mod reply;

// Re-export for convenience
pub use codec::*;
pub use command::*;
pub use reply::*;
