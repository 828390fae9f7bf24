//! # System Interaction Layer
//!
//! Boundary between the command engine and the operating system.
//!
//! ## Modules
//!
//! - **`executor`**: spawns the wrapped processes (`ProcessRunner`), with a
//!   recording double for tests.
//! - **`assets`**: lists the asset directory and instantiates files from it.
//! - **`prompter`**: interactive questions asked by the `prompt` template function.

pub mod assets;
pub mod executor;
pub mod prompter;
