pub mod error;
pub mod generator;
pub mod model;
pub mod worker;
