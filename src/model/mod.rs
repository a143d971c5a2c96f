pub mod data;
pub mod extract;
pub mod step;
pub mod suite;
