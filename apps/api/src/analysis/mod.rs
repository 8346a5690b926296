// Analysis records: the immutable root every artifact is attached to,
// plus the pure scoring math shown alongside them.

pub mod handlers;
pub mod scoring;
pub mod store;
