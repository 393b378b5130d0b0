//! The Python-facing API: thin wrappers that parse keyword arguments into a
//! [`ConvertConfig`], release the GIL for the duration of the work, and map
//! results into plain Python dicts, lists and tuples.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use log::LevelFilter;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::config::{CompressionCodec, ConvertConfig, ParseErrorPolicy};
use crate::convert::{
    convert_csf_text_to_parquet, convert_csf_text_to_parquet_parallel, ConversionReport,
};
use crate::parquet_io::{inspect, CsfRowReader};

static INIT_LOGGER: Once = Once::new();

/// Convert one CSF text file into one Parquet file.
///
/// Returns the conversion report as a dict.
#[pyfunction]
#[pyo3(name = "convert_csf_text_to_parquet")]
#[pyo3(signature = (
    source,
    dest,
    compression = "zstd",
    row_group_rows = 30_000,
    header_lines = 5,
    max_line_len = 256,
    infer_records = 8,
    on_parse_error = "abort",
    parallel = false,
    workers = None
))]
#[allow(clippy::too_many_arguments)]
pub fn convert_py(
    py: Python,
    source: PathBuf,
    dest: PathBuf,
    compression: &str,
    row_group_rows: usize,
    header_lines: usize,
    max_line_len: usize,
    infer_records: usize,
    on_parse_error: &str,
    parallel: bool,
    workers: Option<usize>,
) -> PyResult<PyObject> {
    let config = ConvertConfig {
        compression: CompressionCodec::parse(compression)?,
        row_group_rows,
        header_lines,
        max_line_len,
        infer_records,
        on_parse_error: ParseErrorPolicy::parse(on_parse_error)?,
    };
    let report = py.allow_threads(|| {
        if parallel {
            convert_csf_text_to_parquet_parallel(&source, &dest, &config, workers, None)
        } else {
            convert_csf_text_to_parquet(&source, &dest, &config)
        }
    })?;
    report_to_py(py, &report)
}

/// Read CSF records back out of a Parquet file, reconstructed as the three
/// physical lines per record. `limit` bounds the number of records returned.
#[pyfunction]
#[pyo3(name = "read_csf_from_parquet")]
#[pyo3(signature = (path, limit = None))]
pub fn read_py(
    py: Python,
    path: PathBuf,
    limit: Option<usize>,
) -> PyResult<Vec<(String, String, String)>> {
    let lines = py.allow_threads(|| CsfRowReader::open(&path)?.read_csf_lines(limit))?;
    Ok(lines)
}

/// Summarize a Parquet file from its footer alone: row count, row groups,
/// column layout, codec, file size, and the preserved CSF preamble.
#[pyfunction]
#[pyo3(name = "get_parquet_info")]
pub fn info_py(py: Python, path: PathBuf) -> PyResult<PyObject> {
    let info = py.allow_threads(|| inspect(&path))?;
    let dict = PyDict::new(py);
    dict.set_item("row_count", info.row_count)?;
    dict.set_item("row_groups", info.row_groups)?;
    dict.set_item("compression", &info.compression)?;
    dict.set_item("file_size_bytes", info.file_size_bytes)?;
    dict.set_item("header_lines", &info.header_lines)?;
    dict.set_item("peel_subshells", &info.peel_subshells)?;
    let columns = PyList::empty(py);
    for def in &info.column_defs {
        let column = PyDict::new(py);
        column.set_item("name", &def.name)?;
        column.set_item("kind", def.kind.to_string())?;
        column.set_item("nullable", def.nullable)?;
        columns.append(column)?;
    }
    dict.set_item("columns", columns)?;
    Ok(dict.into_py(py))
}

/// Turn on INFO-level logging, optionally appended to a file.
#[pyfunction]
#[pyo3(name = "enable_verbose_logging")]
#[pyo3(signature = (log_file = None))]
pub fn enable_verbose_logging_py(log_file: Option<String>) {
    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder.is_test(false);
        builder.filter_level(LevelFilter::Info);

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}", record.level(), record.args())?;
            buf.flush()?;
            Ok(())
        });

        if let Some(filename) = log_file {
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(filename)
                .expect("Could not open log file in append mode");
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        let _ = builder.try_init();
    });
}

fn report_to_py(py: Python, report: &ConversionReport) -> PyResult<PyObject> {
    let dict = PyDict::new(py);
    dict.set_item("rows_written", report.rows_written)?;
    dict.set_item("rows_skipped", report.rows_skipped)?;
    dict.set_item("row_groups", report.row_groups)?;
    dict.set_item("lines_read", report.lines_read)?;
    dict.set_item("truncated_lines", report.truncated_lines)?;
    let issues = PyList::empty(py);
    for issue in &report.issues {
        let entry = PyDict::new(py);
        entry.set_item("line", issue.line)?;
        entry.set_item("message", &issue.message)?;
        issues.append(entry)?;
    }
    dict.set_item("issues", issues)?;
    Ok(dict.into_py(py))
}
