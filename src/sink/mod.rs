//! Metric output sink.
//!
//! Append-only CSV writer with a scoped lifetime: opened once at run
//! start, one row per healthy cycle, flushed and closed exactly once at
//! end of input.

use std::io::Write;

use anyhow::{Context, Result};

use crate::metrics::MetricValue;
use crate::segmenter::Cycle;

/// CSV sink for per-cycle metric rows.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    /// Create a sink and write the header row.
    ///
    /// Column order is the metric pipeline order, after the fixed cycle
    /// metadata columns.
    pub fn new(out: W, metric_names: impl Iterator<Item = &'static str>) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(out);

        let mut header = vec!["SequenceNo", "LineFrom", "LineTo", "ColdStart"];
        header.extend(metric_names);
        writer.write_record(&header).context("writing CSV header")?;

        Ok(Self { writer })
    }

    /// Append one row for a healthy cycle and its extracted metrics.
    pub fn write_row(
        &mut self,
        cycle: &Cycle,
        values: &[(&'static str, MetricValue)],
    ) -> Result<()> {
        let mut record = vec![
            cycle.seqno.to_string(),
            cycle.lno_start.to_string(),
            cycle.lno_last().to_string(),
            cycle.cold_start.to_string(),
        ];
        record.extend(values.iter().map(|(_, v)| v.to_string()));

        self.writer
            .write_record(&record)
            .with_context(|| format!("writing CSV row for cycle {}", cycle.seqno))
    }

    /// Flush and release the underlying writer.
    pub fn finish(mut self) -> Result<()> {
        self.writer.flush().context("flushing CSV output")
    }
}
