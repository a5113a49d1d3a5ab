//! Command line parsing

pub mod args;

pub use args::{Args, Command};
