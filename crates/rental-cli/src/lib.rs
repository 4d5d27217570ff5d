//! Library side of the `rental-etl` binary.

pub mod etl;
pub mod logging;
pub mod types;
