//! Terminal output for the modulebus binary
//!
//! Colour handling and report tables.

pub mod colours;
pub mod table;

pub use colours::ColourManager;
pub use table::{format_compact_table, health_table, metrics_table, modules_table};
