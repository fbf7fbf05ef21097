//! CSV lines for each pair and the optional JSON report of a whole sweep.
use std::{
    fs::File,
    io::{self, BufWriter, Write},
};

use anyhow::Context;
use serde::Serialize;

use crate::{
    config::SweepConfig,
    matrix::{LatencyMatrix, PairLatency},
    sweep::LatencySink,
};

/// Writes `<first>,<second>,<mean_ns>` per pair, no header. Every record is flushed right
/// away so results survive a later fatal error.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(output: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(output);
        Self { writer }
    }

    pub fn into_inner(self) -> anyhow::Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to flush csv output: {}", e.error()))
    }
}

impl<W: Write> LatencySink for CsvSink<W> {
    fn record(&mut self, latency: &PairLatency) -> io::Result<()> {
        self.writer.serialize(latency)?;
        self.writer.flush()
    }
}

#[derive(Debug, Serialize)]
pub struct SweepReport<'a> {
    date: String,
    hostname: Option<String>,
    config: &'a SweepConfig,
    latencies: Vec<PairLatency>,
    matrix: Vec<Vec<Option<f64>>>,
}

impl<'a> SweepReport<'a> {
    pub fn new(config: &'a SweepConfig, matrix: &LatencyMatrix) -> Self {
        Self {
            date: chrono::Local::now().to_rfc3339(),
            hostname: hostname(),
            config,
            latencies: matrix.entries().collect(),
            matrix: matrix.rows(),
        }
    }

    pub fn write_jsonfile(&self, filepath: &str) -> anyhow::Result<()> {
        let file = File::create(filepath)
            .with_context(|| format!("failed to create report {}", filepath))?;
        let mut json_file = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut json_file, self)?;
        json_file.flush()?;
        Ok(())
    }
}

#[cfg(unix)]
fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if ret != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Some(String::from_utf8_lossy(&buf[..len]).into_owned())
}

#[cfg(not(unix))]
fn hostname() -> Option<String> {
    None
}
