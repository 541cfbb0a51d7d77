//! Sample output formatting and CSV logging

use crate::core::types::Sample;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Column names of every CSV sample log
pub const CSV_COLUMNS: [&str; 10] = [
    "timestamp_us",
    "elapsed_s",
    "index",
    "device_counter",
    "fx",
    "fy",
    "fz",
    "mx",
    "my",
    "mz",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One human-readable line per sample
    Text,
    /// One JSON object per sample
    Json,
    /// Comma separated, `CSV_COLUMNS` order
    Csv,
}

/// One sample positioned within an acquisition run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub timestamp_us: u64,
    /// Seconds since the first sample of the run
    pub elapsed_s: f64,
    pub index: u64,
    pub device_counter: u16,
    pub fx: f64,
    pub fy: f64,
    pub fz: f64,
    pub mx: f64,
    pub my: f64,
    pub mz: f64,
}

impl SampleRecord {
    pub fn new(index: u64, sample: &Sample, start_us: u64) -> Self {
        Self {
            timestamp_us: sample.timestamp_us(),
            elapsed_s: sample.timestamp_us().saturating_sub(start_us) as f64 / 1e6,
            index,
            device_counter: sample.device_counter(),
            fx: sample.fx(),
            fy: sample.fy(),
            fz: sample.fz(),
            mx: sample.mx(),
            my: sample.my(),
            mz: sample.mz(),
        }
    }

    fn fields(&self, precision: usize) -> Vec<String> {
        vec![
            self.timestamp_us.to_string(),
            format!("{:.6}", self.elapsed_s),
            self.index.to_string(),
            self.device_counter.to_string(),
            format!("{:.*}", precision, self.fx),
            format!("{:.*}", precision, self.fy),
            format!("{:.*}", precision, self.fz),
            format!("{:.*}", precision, self.mx),
            format!("{:.*}", precision, self.my),
            format!("{:.*}", precision, self.mz),
        ]
    }
}

/// Renders sample records as text, JSON or CSV lines
#[derive(Debug, Clone)]
pub struct SampleFormatter {
    pub format: OutputFormat,
    /// Decimal places for force and torque values
    pub precision: u8,
}

impl Default for SampleFormatter {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            precision: 4,
        }
    }
}

impl SampleFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    /// Header line for formats that have one
    pub fn header(&self) -> Option<String> {
        match self.format {
            OutputFormat::Csv => Some(CSV_COLUMNS.join(",")),
            OutputFormat::Text | OutputFormat::Json => None,
        }
    }

    pub fn format(&self, record: &SampleRecord) -> Result<String, serde_json::Error> {
        let precision = self.precision as usize;
        match self.format {
            OutputFormat::Text => Ok(format!(
                "#{:<6} {:>10.6}s  Fx {:+.p$} Fy {:+.p$} Fz {:+.p$} N  Mx {:+.p$} My {:+.p$} Mz {:+.p$} Nm",
                record.index,
                record.elapsed_s,
                record.fx,
                record.fy,
                record.fz,
                record.mx,
                record.my,
                record.mz,
                p = precision
            )),
            OutputFormat::Json => serde_json::to_string(record),
            OutputFormat::Csv => Ok(record.fields(precision).join(",")),
        }
    }
}

/// CSV sample log over any writer
///
/// The header is written on construction; elapsed time is measured from
/// the first sample written.
pub struct CsvSampleWriter<W: Write> {
    writer: csv::Writer<W>,
    precision: usize,
    start_us: Option<u64>,
    written: u64,
}

impl<W: Write> CsvSampleWriter<W> {
    pub fn new(inner: W) -> csv::Result<Self> {
        Self::with_precision(inner, 6)
    }

    pub fn with_precision(inner: W, precision: u8) -> csv::Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(CSV_COLUMNS)?;
        Ok(Self {
            writer,
            precision: precision as usize,
            start_us: None,
            written: 0,
        })
    }

    pub fn write_sample(&mut self, sample: &Sample) -> csv::Result<()> {
        let start_us = *self.start_us.get_or_insert(sample.timestamp_us());
        let record = SampleRecord::new(self.written, sample, start_us);
        self.writer.write_record(record.fields(self.precision))?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    /// Flush and hand back the underlying writer
    pub fn finish(self) -> std::io::Result<W> {
        self.writer.into_inner().map_err(|error| error.into_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: u64, counter: u16, fx: f64) -> Sample {
        Sample::new(ts, counter, [fx, 0.0, -2.5, 0.0, 0.125, 0.0])
    }

    #[test]
    fn test_csv_writer_layout() {
        let mut writer = CsvSampleWriter::with_precision(Vec::new(), 3).unwrap();
        writer.write_sample(&sample(1_000_000, 7, 1.0)).unwrap();
        writer.write_sample(&sample(1_250_000, 8, -0.5)).unwrap();
        assert_eq!(writer.written(), 2);

        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp_us,elapsed_s,index,device_counter,fx,fy,fz,mx,my,mz");
        assert_eq!(lines[1], "1000000,0.000000,0,7,1.000,0.000,-2.500,0.000,0.125,0.000");
        assert_eq!(lines[2], "1250000,0.250000,1,8,-0.500,0.000,-2.500,0.000,0.125,0.000");
    }

    #[test]
    fn test_formatter_csv_matches_header() {
        let formatter = SampleFormatter::new().with_format(OutputFormat::Csv).with_precision(2);
        let header = formatter.header().unwrap();
        let row = formatter.format(&SampleRecord::new(3, &sample(500, 1, 1.0), 0)).unwrap();
        assert_eq!(header.split(',').count(), row.split(',').count());
        assert!(row.starts_with("500,0.000500,3,1,1.00,"));
    }

    #[test]
    fn test_formatter_json() {
        let formatter = SampleFormatter::new().with_format(OutputFormat::Json);
        assert!(formatter.header().is_none());

        let json = formatter.format(&SampleRecord::new(0, &sample(10, 2, 1.5), 10)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["fx"], 1.5);
        assert_eq!(value["device_counter"], 2);
        assert_eq!(value["elapsed_s"], 0.0);
    }

    #[test]
    fn test_formatter_text() {
        let text = SampleFormatter::new()
            .with_precision(1)
            .format(&SampleRecord::new(4, &sample(2_000_000, 0, 1.0), 1_000_000))
            .unwrap();
        assert!(text.starts_with("#4"));
        assert!(text.contains("1.000000s"));
        assert!(text.contains("Fx +1.0"));
        assert!(text.contains("Fz -2.5"));
    }
}
