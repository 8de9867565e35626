/*!
Structured diagnostics for a tree build.
Every cutoff decision and every oracle invocation is reported to a `DiagnosticSink` that is handed to the builder at construction.
Sinks are purely observational, nothing they do changes the resulting tree.
*/

use itertools::Itertools;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::io::Write;

use crate::affinity_tree::AffinityNodeId;
use crate::compatibility::Compatibility;
use crate::cutoff::CutoffKind;
use crate::oracle::RunLabel;
use crate::path_graph::SequenceId;

/// One cutoff decision
#[derive(Clone, Debug, PartialEq)]
pub struct CutoffRecord {
    /// The node whose children are being formed
    pub split_node_id: AffinityNodeId,
    /// Strategy family that made the decision
    pub kind: CutoffKind,
    /// The compatibilities of real sequences the strategy was given
    pub compatibilities: BTreeMap<SequenceId, Compatibility>,
    /// The split node's mincomp, searched alongside the sequences by node cutoffs; None for max cutoffs
    pub parent_mincomp: Option<Compatibility>,
    /// The chosen cutoff, in transformed compatibility space
    pub cutoff: f64,
    /// Why the strategy picked this value
    pub explanation: &'static str
}

impl CutoffRecord {
    /// Renders the compatibilities as `id:value` pairs separated by `;`
    pub fn compatibilities_string(&self) -> String {
        self.compatibilities.iter()
            .map(|(seq_id, comp)| format!("{seq_id}:{}", comp.value()))
            .join(";")
    }
}

/// One consensus oracle invocation
#[derive(Clone, Debug, PartialEq)]
pub struct OracleRecord {
    /// Deterministic artifact name of the invocation
    pub label: RunLabel,
    /// Number of candidate sequences sent to the oracle
    pub candidate_count: usize,
    /// Length of the returned consensus path, None if the oracle failed
    pub path_length: Option<usize>
}

/// Receiver for build diagnostics
pub trait DiagnosticSink {
    /// Called once per cutoff decision
    fn record_cutoff(&mut self, record: CutoffRecord);

    /// Called once per oracle invocation
    fn record_oracle_call(&mut self, record: OracleRecord);
}

/// Discards all diagnostics
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record_cutoff(&mut self, _record: CutoffRecord) {}

    fn record_oracle_call(&mut self, _record: OracleRecord) {}
}

/// Forwards all diagnostics to the `log` facade at debug level
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record_cutoff(&mut self, record: CutoffRecord) {
        let parent = record.parent_mincomp.map(|c| c.value().to_string()).unwrap_or_default();
        debug!(
            "Splitting {}; {}; {}; parent:{parent}; {}; {}",
            record.split_node_id, record.kind, record.compatibilities_string(), record.cutoff, record.explanation
        );
    }

    fn record_oracle_call(&mut self, record: OracleRecord) {
        debug!("Oracle run {}: {} candidates => {:?}", record.label, record.candidate_count, record.path_length);
    }
}

/// Keeps all diagnostics in memory
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    cutoffs: Vec<CutoffRecord>,
    oracle_calls: Vec<OracleRecord>
}

impl MemorySink {
    // Getters
    pub fn cutoffs(&self) -> &[CutoffRecord] {
        &self.cutoffs
    }

    pub fn oracle_calls(&self) -> &[OracleRecord] {
        &self.oracle_calls
    }
}

impl DiagnosticSink for MemorySink {
    fn record_cutoff(&mut self, record: CutoffRecord) {
        self.cutoffs.push(record);
    }

    fn record_oracle_call(&mut self, record: OracleRecord) {
        self.oracle_calls.push(record);
    }
}

/// Flattened CSV row for a cutoff decision
#[derive(Debug, serde::Serialize)]
struct CutoffRow<'a> {
    split_node_id: usize,
    kind: CutoffKind,
    compatibilities: String,
    parent_mincomp: Option<f64>,
    cutoff: f64,
    explanation: &'a str
}

/// Writes one CSV row per cutoff decision; oracle calls are only forwarded to `log`.
/// Rows are flushed as they are written, and the first write failure is reported by `into_inner`.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    /// First error hit while writing, if any
    first_error: Option<csv::Error>
}

impl<W: Write> CsvSink<W> {
    /// Wraps a writer, the header row is emitted with the first record
    pub fn new(inner: W) -> CsvSink<W> {
        CsvSink {
            writer: csv::WriterBuilder::new()
                .has_headers(true)
                .from_writer(inner),
            first_error: None
        }
    }

    /// Flushes and returns the underlying writer
    /// # Errors
    /// * if any cutoff record failed to be written
    /// * if the final flush fails
    pub fn into_inner(self) -> Result<W, Box<dyn std::error::Error>> {
        if let Some(e) = self.first_error {
            return Err(e.into());
        }
        self.writer.into_inner()
            .map_err(|e| e.to_string().into())
    }

    fn write_row(&mut self, row: CutoffRow) -> csv::Result<()> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> DiagnosticSink for CsvSink<W> {
    fn record_cutoff(&mut self, record: CutoffRecord) {
        let row = CutoffRow {
            split_node_id: record.split_node_id.value(),
            kind: record.kind,
            compatibilities: record.compatibilities_string(),
            parent_mincomp: record.parent_mincomp.map(|c| c.value()),
            cutoff: record.cutoff,
            explanation: record.explanation
        };
        if let Err(e) = self.write_row(row) {
            warn!("Failed to write cutoff record: {e}");
            self.first_error.get_or_insert(e);
        }
    }

    fn record_oracle_call(&mut self, record: OracleRecord) {
        LogSink.record_oracle_call(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::compatibility::Sensitivity;

    fn example_record() -> CutoffRecord {
        let compatibilities = [("A", 1.0), ("B", 0.5)].into_iter()
            .map(|(s, c)| (SequenceId::from(s), Compatibility::new(c, &Sensitivity::default())))
            .collect();
        CutoffRecord {
            split_node_id: AffinityNodeId::new(3),
            kind: CutoffKind::Node,
            compatibilities,
            parent_mincomp: Some(Compatibility::new(0.25, &Sensitivity::default())),
            cutoff: 1.0,
            explanation: "No so far cutoffs. Find max distance in sorted values."
        }
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::default();
        sink.record_cutoff(example_record());
        sink.record_oracle_call(OracleRecord { label: RunLabel::Root, candidate_count: 2, path_length: Some(5) });
        assert_eq!(sink.cutoffs().len(), 1);
        assert_eq!(sink.oracle_calls()[0].label.to_string(), "root");
    }

    #[test]
    fn test_csv_sink() {
        let mut sink = CsvSink::new(vec![]);
        sink.record_cutoff(example_record());
        let bytes = sink.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "split_node_id,kind,compatibilities,parent_mincomp,cutoff,explanation\n\
            3,NODE,A:1;B:0.5,0.25,1.0,No so far cutoffs. Find max distance in sorted values.\n");
    }

    /// Writer that rejects the first write and accepts everything after
    #[derive(Default)]
    struct FlakyWriter {
        failed_once: bool,
        data: Vec<u8>
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.failed_once {
                self.failed_once = true;
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_csv_sink_reports_write_failure() {
        let mut sink = CsvSink::new(FlakyWriter::default());
        sink.record_cutoff(example_record());
        sink.record_cutoff(example_record());
        let error = sink.into_inner().err().unwrap();
        assert!(error.to_string().contains("disk full"));
    }

    #[test]
    fn test_csv_sink_max_record() {
        let record = CutoffRecord {
            kind: CutoffKind::Max,
            parent_mincomp: None,
            cutoff: 0.5,
            explanation: "Find max distance in all sorted values.",
            ..example_record()
        };
        let mut sink = CsvSink::new(vec![]);
        sink.record_cutoff(record);
        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert!(text.ends_with("3,MAX,A:1;B:0.5,,0.5,Find max distance in all sorted values.\n"));
    }
}
