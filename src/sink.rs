//! Consumers of finalized results
//!
//! The engine hands each [`StatResult`] to a [`ResultSink`]. Two sinks ship
//! with the crate: [`MemorySink`] collects results in order, and
//! [`JsonLinesSink`] appends one readable JSON object per result to a file
//! per (variable, statistic kind).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::ArrayD;
use serde_json::{json, Value};
use tracing::info;

use crate::accumulator::StatKind;
use crate::error::Result;
use crate::result::{StatResult, StatValue};

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Destination for finalized results
pub trait ResultSink {
    /// Take ownership of one result
    fn accept(&mut self, result: StatResult) -> Result<()>;

    /// Push buffered output to its destination
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps every result in arrival order
#[derive(Debug, Default)]
pub struct MemorySink {
    results: Vec<StatResult>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &[StatResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<StatResult> {
        self.results
    }
}

impl ResultSink for MemorySink {
    fn accept(&mut self, result: StatResult) -> Result<()> {
        self.results.push(result);
        Ok(())
    }
}

/// Appends results as JSON lines under a directory
///
/// Files are named `<variable>_<kind>.jsonl`. Non-finite values are written
/// as `null`.
pub struct JsonLinesSink {
    dir: PathBuf,
    writers: HashMap<(String, StatKind), BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            writers: HashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file results for (`variable`, `kind`) are appended to
    pub fn file_for(&self, variable: &str, kind: StatKind) -> PathBuf {
        self.dir.join(format!("{}_{}.jsonl", variable, kind))
    }

    fn writer(&mut self, variable: &str, kind: StatKind) -> Result<&mut BufWriter<File>> {
        let path = self.file_for(variable, kind);
        match self.writers.entry((variable.to_string(), kind)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                info!(path = %path.display(), "writing results");
                Ok(entry.insert(BufWriter::new(file)))
            }
        }
    }
}

impl ResultSink for JsonLinesSink {
    fn accept(&mut self, result: StatResult) -> Result<()> {
        let line = serde_json::to_string(&readable(&result))?;
        let writer = self.writer(&result.variable, result.kind)?;
        writeln!(writer, "{}", line)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for JsonLinesSink {
    fn drop(&mut self) {
        let _ = ResultSink::flush(self);
    }
}

fn number(v: f64) -> Value {
    if v.is_finite() {
        json!(v)
    } else {
        Value::Null
    }
}

fn field(array: &ArrayD<f64>) -> Value {
    json!({
        "shape": array.shape(),
        "data": array.iter().map(|&v| number(v)).collect::<Vec<_>>(),
    })
}

fn readable_value(value: &StatValue) -> Value {
    match value {
        StatValue::Field { values } => json!({ "type": "field", "values": field(values) }),
        StatValue::Extreme { values, timings } => json!({
            "type": "extreme",
            "values": field(values),
            "timings": timings
                .iter()
                .map(|t| t.map(|t| t.format(TIME_FORMAT).to_string()))
                .collect::<Vec<_>>(),
        }),
        StatValue::Exceedance { threshold, counts, frequency } => json!({
            "type": "exceedance",
            "threshold": number(*threshold),
            "counts": { "shape": counts.shape(), "data": counts.iter().collect::<Vec<_>>() },
            "frequency": field(frequency),
        }),
        StatValue::Percentiles { percentiles, values } => json!({
            "type": "percentiles",
            "percentiles": percentiles,
            "values": field(values),
        }),
        StatValue::Histogram { counts, edges } => json!({
            "type": "histogram",
            "counts": field(counts),
            "edges": field(edges),
        }),
        StatValue::Raw { entries } => json!({
            "type": "raw",
            "entries": entries
                .iter()
                .map(|e| json!({ "timestamp": e.timestamp.format(TIME_FORMAT).to_string(), "values": field(&e.values) }))
                .collect::<Vec<_>>(),
        }),
        StatValue::Empty => json!({ "type": "empty" }),
    }
}

/// Self-describing JSON form of a result
pub fn readable(result: &StatResult) -> Value {
    json!({
        "variable": result.variable,
        "statistic": result.kind.as_str(),
        "frequency": result.frequency().as_str(),
        "dims": result.dims,
        "start": result.start().format(TIME_FORMAT).to_string(),
        "end": result.end().format(TIME_FORMAT).to_string(),
        "output_start": result.output_start.format(TIME_FORMAT).to_string(),
        "output_end": result.output_end.format(TIME_FORMAT).to_string(),
        "complete": result.is_complete(),
        "partial": result.is_partial(),
        "provisional": result.provisional,
        "absorbed": result.absorbed(),
        "expected": result.expected(),
        "gaps": result.gaps(),
        "value": readable_value(&result.value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buckets::{Bucket, Frequency};
    use chrono::{NaiveDate, NaiveDateTime};
    use ndarray::IxDyn;

    fn at(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn result(variable: &str, kind: StatKind, values: Vec<f64>) -> StatResult {
        let mut bucket = Bucket::new(at(1), at(2), Frequency::Daily, 24);
        bucket.absorbed = 24;
        bucket.complete = true;
        StatResult {
            variable: variable.to_string(),
            kind,
            dims: vec!["site".to_string()],
            bucket,
            provisional: false,
            output_start: at(1),
            output_end: at(2),
            value: StatValue::Field {
                values: ArrayD::from_shape_vec(IxDyn(&[values.len()]), values).unwrap(),
            },
        }
    }

    // ---- MemorySink ----

    #[test]
    fn test_memory_sink_keeps_order() {
        let mut sink = MemorySink::new();
        sink.accept(result("tas", StatKind::Mean, vec![1.0])).unwrap();
        sink.accept(result("pr", StatKind::Max, vec![2.0])).unwrap();
        sink.flush().unwrap();

        assert_eq!(sink.results().len(), 2);
        let results = sink.into_results();
        assert_eq!(results[0].variable, "tas");
        assert_eq!(results[1].variable, "pr");
    }

    // ---- Readable form ----

    #[test]
    fn test_readable_writes_nan_as_null() {
        let value = readable(&result("tas", StatKind::Mean, vec![1.5, f64::NAN]));

        assert_eq!(value["statistic"], "mean");
        assert_eq!(value["frequency"], "daily");
        assert_eq!(value["start"], "2020-01-01T00:00:00");
        assert_eq!(value["complete"], true);
        assert_eq!(value["value"]["values"]["data"][0], 1.5);
        assert!(value["value"]["values"]["data"][1].is_null());
    }

    // ---- JsonLinesSink ----

    #[test]
    fn test_json_lines_one_file_per_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonLinesSink::new(dir.path().join("out")).unwrap();

        sink.accept(result("tas", StatKind::Mean, vec![1.0])).unwrap();
        sink.accept(result("tas", StatKind::Mean, vec![2.0])).unwrap();
        sink.accept(result("tas", StatKind::Max, vec![3.0])).unwrap();
        sink.flush().unwrap();

        let means = fs::read_to_string(sink.file_for("tas", StatKind::Mean)).unwrap();
        let lines: Vec<&str> = means.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["value"]["values"]["data"][0], 2.0);

        let maxes = fs::read_to_string(sink.file_for("tas", StatKind::Max)).unwrap();
        assert_eq!(maxes.lines().count(), 1);
    }

    #[test]
    fn test_json_lines_flushes_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let mut sink = JsonLinesSink::new(dir.path()).unwrap();
            sink.accept(result("tas", StatKind::Mean, vec![1.0])).unwrap();
            sink.file_for("tas", StatKind::Mean)
        };
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
