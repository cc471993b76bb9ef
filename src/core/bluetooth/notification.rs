//! Payload handling for the heading peripheral
//! Decodes notification and poll payloads and forwards valid headings to the reporter

use log::debug;

use crate::core::heading::{Heading, HeadingParser, StatusReporter};

/// Turns raw characteristic values into heading reports
pub struct NotificationHandler {
    parser: HeadingParser,
    reporter: StatusReporter,
}

impl NotificationHandler {
    pub fn new(reporter: StatusReporter) -> Self {
        Self {
            parser: HeadingParser::new(),
            reporter,
        }
    }

    /// Reports the heading carried by `data`, if any. Unparseable payloads are dropped quietly.
    pub fn handle_payload(&self, data: &[u8]) -> Option<Heading> {
        debug!("Received compass data: {:?}", data);
        let heading = self.parser.parse(data);
        match heading {
            Some(heading) => self.reporter.report_heading(heading),
            None => debug!("Ignoring payload without a heading"),
        }
        heading
    }
}
