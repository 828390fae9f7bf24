// EN: src/core/mod.rs

pub mod arg_parser;
pub mod command_tree;
pub mod config_loader;
pub mod driver;
pub mod help_router;
pub mod interpolator;
pub mod session;
