pub mod clock;
pub mod dedup;
pub mod errors;
pub mod normalize;
pub mod ratelimit;
pub mod retry;
pub mod table;
