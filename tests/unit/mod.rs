//! Unit tests for individual components

mod config_test;
mod error_test;
mod filter_test;
mod render_test;
mod runtime_test;
mod signal_test;
