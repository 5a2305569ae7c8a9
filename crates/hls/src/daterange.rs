use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

/// A single `#EXT-X-DATERANGE` entry, identified by a SCTE-35 splice event id
/// (or any other source-assigned id).
#[derive(Debug, Clone)]
pub struct Daterange {
    pub id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub attributes: BTreeMap<String, String>,
}

impl Daterange {
    pub fn open(id: impl Into<String>, start_date: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            start_date,
            end_date: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn close(&mut self, end_date: DateTime<Utc>) {
        self.end_date = Some(end_date);
    }

    /// `#EXT-X-DATERANGE:ID="…",START-DATE="…"[,DURATION=…][,attrs]`, with a
    /// second `END-DATE` line appended once closed. `DURATION` and
    /// `PLANNED-DURATION` are mutually exclusive: a closed range reports its
    /// real duration and suppresses any planned estimate.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        write!(
            out,
            "#EXT-X-DATERANGE:ID=\"{}\",START-DATE=\"{}\"",
            escape(&self.id),
            self.start_date.to_rfc3339()
        )
        .unwrap();

        if let Some(end_date) = self.end_date {
            let duration = (end_date - self.start_date).num_milliseconds() as f64 / 1000.0;
            write!(out, ",DURATION={duration:.3}").unwrap();
        }

        for (key, value) in &self.attributes {
            if self.end_date.is_some() && key == "PLANNED-DURATION" {
                continue;
            }
            if looks_numeric(value) {
                write!(out, ",{key}={value}").unwrap();
            } else {
                write!(out, ",{key}=\"{}\"", escape(value)).unwrap();
            }
        }
        out.push('\n');

        if let Some(end_date) = self.end_date {
            writeln!(out, "#EXT-X-DATERANGE:ID=\"{}\",END-DATE=\"{}\"", escape(&self.id), end_date.to_rfc3339()).unwrap();
        }

        out
    }
}

fn looks_numeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_hexdigit() || c == 'x' || c == '.')
        && (value.starts_with("0x") || value.parse::<f64>().is_ok())
}

fn escape(value: &str) -> String {
    value.replace('"', "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn serializes_open_range_with_planned_duration() {
        let start = Utc::now();
        let dr = Daterange::open("1", start)
            .with_attribute("SCTE35-OUT", "0x1234")
            .with_attribute("PLANNED-DURATION", "30.0");
        let text = dr.serialize();
        assert!(text.contains("ID=\"1\""));
        assert!(text.contains("SCTE35-OUT=0x1234"));
        assert!(text.contains("PLANNED-DURATION=30.0"));
        assert!(!text.contains("END-DATE"));
    }

    #[test]
    fn closing_suppresses_planned_duration_and_adds_end_line() {
        let start = Utc::now();
        let mut dr = Daterange::open("1", start).with_attribute("PLANNED-DURATION", "30.0");
        dr.close(start + Duration::seconds(30));
        let text = dr.serialize();
        assert!(text.contains("DURATION=30.000"));
        assert!(!text.contains("PLANNED-DURATION"));
        assert!(text.contains("END-DATE"));
    }
}
