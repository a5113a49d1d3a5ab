//! Module Lifecycle Tests
//!
//! Lifecycle, health and binding tests driven through the bus with mock
//! modules.
