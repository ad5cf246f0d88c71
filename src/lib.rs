pub mod cazy;
pub mod cli;
pub mod commands;
pub mod schema;
