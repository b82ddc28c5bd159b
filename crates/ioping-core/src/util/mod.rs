//! Utility modules for the ioping exporter.

mod duration_parser;

pub use duration_parser::{DurationParseError, parse_duration};
