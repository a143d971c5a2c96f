pub mod blocks;
pub mod cli;
pub mod driver;
pub mod engine;
pub mod model;
