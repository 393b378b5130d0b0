//! The conversion orchestrator: drives classify -> tokenize -> buffer ->
//! flush for one job, owns the job state machine, and aggregates recoverable
//! record errors into the conversion report.
//!
//! Phases: `Idle -> SchemaPending -> Streaming <-> Flushing -> Closed`, with
//! `Failed` as the terminal error state. The schema freezes exactly once per
//! job (from the preamble's peel declaration, or by observing the first
//! records), before the first column buffer exists. Structural errors abort
//! the job and, through the sink's staging contract, leave no partially
//! valid output file.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

use crate::buffer::ColumnBufferSet;
use crate::config::{ConvertConfig, ParseErrorPolicy};
use crate::error::RcsfsError;
use crate::parquet_io::{FileHeader, ParquetSink};
use crate::record::{
    FieldTokenizer, LineClassifier, LineKind, RawCsfRecord, RecordAssembler,
};
use crate::schema::{CsfSchema, SchemaBuilder};

/// Lifecycle of one conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    SchemaPending,
    Streaming,
    Flushing,
    Closed,
    Failed,
}

/// One recovered per-record error, kept when the policy is `Collect`.
#[derive(Serialize, Debug, Clone)]
pub struct RecordIssue {
    /// 1-based source line number the error points at.
    pub line: u64,
    pub message: String,
}

/// The outcome summary of one conversion job.
#[derive(Serialize, Debug, Clone, Default)]
pub struct ConversionReport {
    pub rows_written: u64,
    pub rows_skipped: u64,
    pub row_groups: usize,
    pub lines_read: u64,
    pub truncated_lines: u64,
    /// Populated only under the `Collect` policy.
    pub issues: Vec<RecordIssue>,
}

/// Cooperative cancellation flag, honored at row-group flush boundaries.
/// Cancelling a job discards the staged output; previously written files are
/// untouched.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Convert one CSF text file into one Parquet file.
pub fn convert_csf_text_to_parquet(
    source: &Path,
    dest: &Path,
    config: &ConvertConfig,
) -> Result<ConversionReport, RcsfsError> {
    let reader = BufReader::new(File::open(source)?);
    info!("converting {} -> {}", source.display(), dest.display());
    convert_csf_reader(reader, dest, config, None)
}

/// Like [`convert_csf_text_to_parquet`], but tokenizes record chunks on a
/// rayon pool. Row order in the output is identical to the sequential path.
pub fn convert_csf_text_to_parquet_parallel(
    source: &Path,
    dest: &Path,
    config: &ConvertConfig,
    workers: Option<usize>,
    cancel: Option<&CancelToken>,
) -> Result<ConversionReport, RcsfsError> {
    let reader = BufReader::new(File::open(source)?);
    info!(
        "converting {} -> {} ({} workers)",
        source.display(),
        dest.display(),
        workers.map_or_else(|| "default".to_string(), |w| w.to_string())
    );
    match workers {
        None => convert_parallel_impl(reader, dest, config, cancel),
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| RcsfsError::Config(e.to_string()))?;
            pool.install(|| convert_parallel_impl(reader, dest, config, cancel))
        }
    }
}

/// Convert from any buffered line source, with optional cancellation.
pub fn convert_csf_reader<R: BufRead>(
    reader: R,
    dest: &Path,
    config: &ConvertConfig,
    cancel: Option<&CancelToken>,
) -> Result<ConversionReport, RcsfsError> {
    config.validate()?;
    let mut stream = RecordStream::new(reader, config);
    let mut job = ConversionJob::new(dest, config, cancel.cloned());

    let result = (|| {
        while let Some(item) = stream.next_record()? {
            job.begin_body(&stream)?;
            match item {
                Ok(record) => job.push_record(record)?,
                Err(issue) => job.note_issue(issue)?,
            }
        }
        job.begin_body(&stream)?;
        job.finish(stream.lines_read(), stream.truncated_lines())
    })();

    job.resolve(result)
}

fn convert_parallel_impl<R: BufRead>(
    reader: R,
    dest: &Path,
    config: &ConvertConfig,
    cancel: Option<&CancelToken>,
) -> Result<ConversionReport, RcsfsError> {
    config.validate()?;
    let mut stream = RecordStream::new(reader, config);
    let mut job = ConversionJob::new(dest, config, cancel.cloned());
    let chunk_size = config.row_group_rows;

    let result = (|| {
        let mut chunk: Vec<RawCsfRecord> = Vec::with_capacity(chunk_size);
        while let Some(item) = stream.next_record()? {
            job.begin_body(&stream)?;
            match item {
                Err(issue) => job.note_issue(issue)?,
                // Until the schema freezes, records go through the
                // sequential inference path.
                Ok(record) if !job.is_ready() => job.push_record(record)?,
                Ok(record) => {
                    chunk.push(record);
                    if chunk.len() == chunk_size {
                        job.push_chunk(std::mem::take(&mut chunk))?;
                    }
                }
            }
        }
        job.begin_body(&stream)?;
        if !chunk.is_empty() {
            job.push_chunk(chunk)?;
        }
        job.finish(stream.lines_read(), stream.truncated_lines())
    })();

    job.resolve(result)
}

//==================================================================================
// Record stream: lines -> classified lines -> assembled raw records
//==================================================================================

struct RecordStream<R: BufRead> {
    lines: std::io::Lines<R>,
    classifier: LineClassifier,
    assembler: RecordAssembler,
    max_line_len: usize,
    truncated: u64,
    exhausted: bool,
}

/// One streamed item: a complete raw record, or a recoverable per-record
/// error to be resolved by the job's parse-error policy.
type StreamItem = Result<RawCsfRecord, RcsfsError>;

impl<R: BufRead> RecordStream<R> {
    fn new(reader: R, config: &ConvertConfig) -> Self {
        Self {
            lines: reader.lines(),
            classifier: LineClassifier::new(config.header_lines),
            assembler: RecordAssembler::new(),
            max_line_len: config.max_line_len,
            truncated: 0,
            exhausted: false,
        }
    }

    /// Pull the next record or recoverable issue. The outer `Result` carries
    /// fatal I/O errors only.
    fn next_record(&mut self) -> Result<Option<StreamItem>, RcsfsError> {
        loop {
            if self.exhausted {
                return Ok(None);
            }
            let Some(line) = self.lines.next().transpose()? else {
                self.exhausted = true;
                return match self.assembler.finish() {
                    Ok(()) => Ok(None),
                    Err(issue) => Ok(Some(Err(issue))),
                };
            };
            let line = self.clip(&line);
            let kind = self.classifier.classify(&line)?;
            if kind == LineKind::Header {
                continue;
            }
            match self.assembler.push(kind, &line, self.classifier.line_no()) {
                Ok(Some(record)) => return Ok(Some(Ok(record))),
                Ok(None) => continue,
                Err(issue) => return Ok(Some(Err(issue))),
            }
        }
    }

    fn clip(&mut self, line: &str) -> String {
        if line.len() <= self.max_line_len {
            return line.to_string();
        }
        let mut cut = self.max_line_len;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        self.truncated += 1;
        line[..cut].to_string()
    }

    fn header_lines(&self) -> Vec<String> {
        self.classifier.header().to_vec()
    }

    fn peel_subshells(&self) -> Option<Vec<String>> {
        self.classifier.peel_subshells().map(<[String]>::to_vec)
    }

    fn lines_read(&self) -> u64 {
        self.classifier.line_no()
    }

    fn truncated_lines(&self) -> u64 {
        self.truncated
    }
}

//==================================================================================
// Conversion job: schema freeze, buffering, flushing, report aggregation
//==================================================================================

/// Everything a job owns once the schema is frozen.
struct ReadyState {
    tokenizer: FieldTokenizer,
    buffers: ColumnBufferSet,
    sink: ParquetSink,
}

struct ConversionJob {
    dest: PathBuf,
    config: ConvertConfig,
    cancel: Option<CancelToken>,
    phase: JobPhase,
    report: ConversionReport,
    header_lines: Vec<String>,
    begun: bool,
    // Inference path state, drained when the schema freezes.
    builder: SchemaBuilder,
    pending_infer: Vec<RawCsfRecord>,
    first_labels: Option<Vec<String>>,
    ready: Option<ReadyState>,
}

impl ConversionJob {
    fn new(dest: &Path, config: &ConvertConfig, cancel: Option<CancelToken>) -> Self {
        Self {
            dest: dest.to_path_buf(),
            config: config.clone(),
            cancel,
            phase: JobPhase::Idle,
            report: ConversionReport::default(),
            header_lines: Vec::new(),
            begun: false,
            builder: SchemaBuilder::new(),
            pending_infer: Vec::new(),
            first_labels: None,
            ready: None,
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.is_some()
    }

    /// Called once the preamble has been fully consumed. A declared peel
    /// list freezes the schema immediately; otherwise the job stays in
    /// `SchemaPending` until inference has seen enough records.
    fn begin_body<R: BufRead>(&mut self, stream: &RecordStream<R>) -> Result<(), RcsfsError> {
        if self.begun {
            return Ok(());
        }
        self.begun = true;
        self.set_phase(JobPhase::SchemaPending);
        self.header_lines = stream.header_lines();
        if let Some(peel) = stream.peel_subshells() {
            let schema = CsfSchema::declared(&peel);
            self.make_ready(schema, peel)?;
        }
        Ok(())
    }

    fn make_ready(&mut self, schema: CsfSchema, peel: Vec<String>) -> Result<(), RcsfsError> {
        let header = FileHeader {
            header_lines: self.header_lines.clone(),
            peel_subshells: peel.clone(),
        };
        let buffers = ColumnBufferSet::new(schema);
        let sink = ParquetSink::open(
            &self.dest,
            buffers.arrow_schema(),
            self.config.compression,
            self.config.row_group_rows,
            &header,
        )?;
        self.ready = Some(ReadyState {
            tokenizer: FieldTokenizer::with_peel(peel),
            buffers,
            sink,
        });
        self.set_phase(JobPhase::Streaming);
        Ok(())
    }

    fn push_record(&mut self, record: RawCsfRecord) -> Result<(), RcsfsError> {
        if self.ready.is_some() {
            return self.tokenize_and_append(record);
        }
        // Inference: observe in discovery mode, buffer the raw record, and
        // freeze once enough records have been seen.
        match FieldTokenizer::discover().tokenize(&record) {
            Err(issue) => self.note_issue(issue),
            Ok(tokenized) => {
                self.builder.observe(&tokenized.named_fields())?;
                if self.first_labels.is_none() {
                    self.first_labels = Some(tokenized.labels());
                }
                self.pending_infer.push(record);
                if self.builder.observed() >= self.config.infer_records {
                    self.freeze_inferred()?;
                }
                Ok(())
            }
        }
    }

    fn freeze_inferred(&mut self) -> Result<(), RcsfsError> {
        let builder = std::mem::take(&mut self.builder);
        let schema = builder.freeze()?;
        let peel = self.first_labels.clone().unwrap_or_default();
        debug!(
            "schema inferred from {} records ({} columns)",
            self.pending_infer.len(),
            schema.len()
        );
        self.make_ready(schema, peel)?;
        for record in std::mem::take(&mut self.pending_infer) {
            self.tokenize_and_append(record)?;
        }
        Ok(())
    }

    fn tokenize_and_append(&mut self, record: RawCsfRecord) -> Result<(), RcsfsError> {
        let tokenized = match &self.ready {
            None => return Err(sink_not_ready()),
            Some(ready) => ready.tokenizer.tokenize(&record),
        };
        match tokenized {
            Err(issue) => self.note_issue(issue),
            Ok(record) => self.append_values(&record.values()),
        }
    }

    /// Tokenize a chunk of records in parallel, then append in input order.
    fn push_chunk(&mut self, chunk: Vec<RawCsfRecord>) -> Result<(), RcsfsError> {
        let tokenizer = match &self.ready {
            None => return Err(sink_not_ready()),
            Some(ready) => ready.tokenizer.clone(),
        };
        let tokenized: Vec<Result<_, RcsfsError>> =
            chunk.par_iter().map(|r| tokenizer.tokenize(r)).collect();
        for result in tokenized {
            match result {
                Err(issue) => self.note_issue(issue)?,
                Ok(record) => self.append_values(&record.values())?,
            }
        }
        Ok(())
    }

    fn append_values(&mut self, values: &[crate::schema::FieldValue]) -> Result<(), RcsfsError> {
        let buffered = {
            let Some(ready) = self.ready.as_mut() else {
                return Err(sink_not_ready());
            };
            ready.buffers.append_row(values)?;
            ready.buffers.rows()
        };
        self.report.rows_written += 1;
        if buffered >= self.config.row_group_rows {
            self.flush_row_group()?;
        }
        Ok(())
    }

    fn flush_row_group(&mut self) -> Result<(), RcsfsError> {
        self.set_phase(JobPhase::Flushing);
        let cancelled = self.cancel.as_ref().is_some_and(|c| c.is_cancelled());
        let row_groups = {
            let Some(ready) = self.ready.as_mut() else {
                return Err(sink_not_ready());
            };
            if cancelled {
                return Err(RcsfsError::Cancelled {
                    rows_flushed: ready.sink.rows(),
                });
            }
            let batch = ready.buffers.flush()?;
            ready.sink.write_row_group(&batch)?;
            ready.sink.row_groups()
        };
        self.report.row_groups = row_groups;
        self.set_phase(JobPhase::Streaming);
        Ok(())
    }

    /// Resolve a recoverable per-record error against the configured policy.
    fn note_issue(&mut self, issue: RcsfsError) -> Result<(), RcsfsError> {
        if !issue.is_recoverable() {
            return Err(issue);
        }
        match self.config.on_parse_error {
            ParseErrorPolicy::Abort => Err(issue),
            ParseErrorPolicy::SkipRow => {
                self.report.rows_skipped += 1;
                Ok(())
            }
            ParseErrorPolicy::Collect => {
                self.report.rows_skipped += 1;
                self.report.issues.push(RecordIssue {
                    line: issue.line().unwrap_or(0),
                    message: issue.to_string(),
                });
                Ok(())
            }
        }
    }

    fn finish(
        &mut self,
        lines_read: u64,
        truncated_lines: u64,
    ) -> Result<ConversionReport, RcsfsError> {
        if self.ready.is_none() {
            if self.builder.observed() == 0 {
                return Err(RcsfsError::SchemaConflict {
                    column: String::new(),
                    reason: "no peel declaration and no records to infer a schema from"
                        .to_string(),
                });
            }
            self.freeze_inferred()?;
        }
        let has_rows = self.ready.as_ref().is_some_and(|r| !r.buffers.is_empty());
        if has_rows {
            self.flush_row_group()?;
        }
        let Some(ready) = self.ready.take() else {
            return Err(sink_not_ready());
        };
        ready.sink.close()?;
        self.set_phase(JobPhase::Closed);

        self.report.lines_read = lines_read;
        self.report.truncated_lines = truncated_lines;
        info!(
            "conversion closed: {} rows, {} skipped, {} row groups",
            self.report.rows_written, self.report.rows_skipped, self.report.row_groups
        );
        Ok(self.report.clone())
    }

    /// Final bookkeeping: a failed job lands in the `Failed` phase, and its
    /// still-open sink (if any) is dropped, which discards the staged file.
    fn resolve(
        mut self,
        result: Result<ConversionReport, RcsfsError>,
    ) -> Result<ConversionReport, RcsfsError> {
        if result.is_err() {
            self.set_phase(JobPhase::Failed);
            if let Some(ready) = self.ready.take() {
                ready.sink.abort();
            }
        }
        result
    }

    fn set_phase(&mut self, phase: JobPhase) {
        if self.phase != phase {
            debug!("job phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}

fn sink_not_ready() -> RcsfsError {
    RcsfsError::Write("conversion sink used before the schema was frozen".to_string())
}
