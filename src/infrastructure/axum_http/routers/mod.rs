pub mod callbacks;
pub mod payments;
