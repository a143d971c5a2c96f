pub mod context;
pub mod handler;
pub mod interpreter;
pub mod plugin;
pub mod registry;
pub mod report;
pub mod resolve;
pub mod result;
