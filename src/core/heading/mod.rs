//! Compass heading decoding and reporting.

pub mod parser;
pub mod reporter;

pub use parser::{Heading, HeadingParser};
pub use reporter::{ConnectionStatus, StatusReporter};
