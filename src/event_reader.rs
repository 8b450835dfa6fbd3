//! JSONL event reader - the loader boundary
//!
//! The external loader is expected to have resolved timestamps to integer
//! epochs already; pipe-delimited impression/price strings are passed
//! through untouched for the assembler to split.

use crate::types::Event;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

pub struct JsonlEventReader {
    lines: Lines<BufReader<File>>,
    line_number: u64,
}

impl JsonlEventReader {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_number: 0,
        })
    }
}

impl Iterator for JsonlEventReader {
    type Item = Event;

    /// Yields events in file order; unreadable or unparsable lines are
    /// skipped with a warning rather than aborting the stream
    fn next(&mut self) -> Option<Event> {
        loop {
            self.line_number += 1;
            match self.lines.next()? {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match Event::from_jsonl(&line) {
                        Ok(event) => return Some(event),
                        Err(e) => {
                            log::warn!("Skipping malformed event at line {}: {}", self.line_number, e);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Skipping unreadable line {}: {}", self.line_number, e);
                }
            }
        }
    }
}
