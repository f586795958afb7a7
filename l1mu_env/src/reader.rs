//! JSON-lines event files: one serialized [`Event`] per line.

use crate::error::EnvError;
use crate::source::Event;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Streams events from a JSON-lines source.
///
/// Blank lines are skipped. Parse failures carry the 1-based line number and
/// do not stop the iterator; the caller decides whether to continue.
pub struct JsonLinesReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl JsonLinesReader<BufReader<File>> {
    /// Opens an event file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EnvError> {
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonLinesReader<R> {
    /// Wraps any buffered reader.
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for JsonLinesReader<R> {
    type Item = Result<Event, EnvError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            let line_no = self.line_no;
            let parsed = serde_json::from_str::<Event>(&line)
                .map_err(|e| EnvError::Parse {
                    line: line_no,
                    message: e.to_string(),
                })
                .and_then(|event| {
                    event.validate().map_err(|e| EnvError::Parse {
                        line: line_no,
                        message: e.to_string(),
                    })?;
                    Ok(event)
                });
            return Some(parsed);
        }
    }
}

/// Appends one event as a single JSON line.
pub fn write_event<W: Write>(writer: &mut W, event: &Event) -> Result<(), EnvError> {
    let json = serde_json::to_string(event).map_err(|e| EnvError::Io(e.into()))?;
    writer.write_all(json.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{EventId, EventSource};
    use crate::types::{BxCollection, Muon};
    use std::io::Cursor;

    fn sample_event(n: u64) -> Event {
        let muon = Muon {
            hw_pt: 40,
            hw_eta: -12,
            hw_phi: 300,
            hw_qual: 12,
            hw_charge: 1,
            hw_charge_valid: true,
            hw_iso: 3,
            hw_iso_sum: 5,
            hw_rank: 9,
            origin: None,
        };
        Event::new(EventId::new(1, n))
            .with_muons("ugmt", BxCollection::central().with_bx(0, vec![muon]).unwrap())
    }

    #[test]
    fn test_round_trip_through_lines() {
        let mut buf = Vec::new();
        write_event(&mut buf, &sample_event(1)).unwrap();
        buf.extend_from_slice(b"\n");
        write_event(&mut buf, &sample_event(2)).unwrap();

        let events: Vec<Event> = JsonLinesReader::from_reader(Cursor::new(buf))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].id.event, 2);
        assert_eq!(events[0].muons(&"ugmt".into()).unwrap().size(0), 1);
    }

    #[test]
    fn test_parse_error_reports_line() {
        let mut buf = Vec::new();
        write_event(&mut buf, &sample_event(1)).unwrap();
        buf.extend_from_slice(b"{not json}\n");

        let results: Vec<_> = JsonLinesReader::from_reader(Cursor::new(buf)).collect();
        assert!(results[0].is_ok());
        match &results[1] {
            Err(EnvError::Parse { line, .. }) => assert_eq!(*line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_collection_rejected() {
        let line = r#"{"id":{"run":1,"event":1},"muons":{"ugmt":{"first_bx":0,"last_bx":2,"buckets":[[]]}}}"#;
        let mut reader = JsonLinesReader::from_reader(Cursor::new(line.as_bytes().to_vec()));
        assert!(matches!(reader.next(), Some(Err(EnvError::Parse { line: 1, .. }))));
    }

    #[test]
    fn test_extreme_bx_range_rejected() {
        let line = r#"{"id":{"run":1,"event":1},"muons":{"ugmt":{"first_bx":-2147483648,"last_bx":2147483647,"buckets":[]}}}"#;
        let mut reader = JsonLinesReader::from_reader(Cursor::new(line.as_bytes().to_vec()));
        assert!(matches!(reader.next(), Some(Err(EnvError::Parse { line: 1, .. }))));
    }
}
