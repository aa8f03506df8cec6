pub mod payments;
pub mod rate_limit;
pub mod reaper;
