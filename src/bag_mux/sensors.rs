pub mod basic;
pub mod header;
pub mod tf;
pub mod timestamp;
pub mod utils;
