use std::io::{self, Stdout, Write};

use log::error;

use crate::{canonical_record::CanonicalRecord, metric_collector::MetricCollector};

/// Writes every record as one line of JSON.
pub struct JsonLines<W: Write + Send> {
    out: W,
}

impl JsonLines<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLines<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_record(&mut self, record: &CanonicalRecord) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

impl<W: Write + Send> MetricCollector for JsonLines<W> {
    fn publish(&mut self, record: &CanonicalRecord) {
        if let Err(e) = self.write_record(record) {
            error!("Failed to write record: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical_record::Telemetry;
    use chrono::Local;

    #[test]
    fn one_line_per_record() {
        let mut sink = JsonLines::new(Vec::new());
        sink.publish(&CanonicalRecord::new(Local::now(), Telemetry::default()));
        sink.publish(&CanonicalRecord::failed(Local::now(), "device unreachable", "timeout"));

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["status"], 0);
        assert!(first.get("error").is_none());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["error"], "device unreachable");
        assert_eq!(second["error_detail"], "timeout");
    }
}
