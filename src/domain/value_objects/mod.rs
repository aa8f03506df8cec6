pub mod callbacks;
pub mod enums;
pub mod payments;
