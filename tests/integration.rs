//! End-to-end conversion tests: CSF text in, Parquet out, and back.

use std::io::Cursor;
use std::path::Path;

use rcsfs::convert::convert_csf_reader;
use rcsfs::schema::{FieldValue, PrimitiveKind};
use rcsfs::{
    convert_csf_text_to_parquet, convert_csf_text_to_parquet_parallel, inspect, CancelToken,
    CompressionCodec, ConvertConfig, CsfRowReader, ParseErrorPolicy, RcsfsError,
};

const LINE1: &str = "  5s ( 2)  4d-( 4)  4d ( 6)  5p-( 2)  5p ( 4)  6s ( 2)";
const LINE2: &str = "                   3/2               2";
const LINE3: &str = "                                                       4-";
const BAD_LINE1: &str = "  5s ( x)  4d-( 4)  4d ( 6)  5p-( 2)  5p ( 4)  6s ( 2)";

fn peel() -> Vec<String> {
    ["5s", "4d-", "4d", "5p-", "5p", "6s"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn header() -> String {
    [
        "Core subshells:",
        "  1s",
        "Peel subshells:",
        "  5s  4d- 4d  5p- 5p  6s",
        "CSF(s):",
    ]
    .join("\n")
        + "\n"
}

fn sample_text(records: usize) -> String {
    let mut text = header();
    for _ in 0..records {
        text.push_str(LINE1);
        text.push('\n');
        text.push_str(LINE2);
        text.push('\n');
        text.push_str(LINE3);
        text.push('\n');
    }
    text
}

/// Like `sample_text`, but with one record's occupation line replaced by a
/// window carrying an unparseable electron count.
fn text_with_bad_record(records: usize, bad_at: usize) -> String {
    let mut text = header();
    for i in 0..records {
        text.push_str(if i == bad_at { BAD_LINE1 } else { LINE1 });
        text.push('\n');
        text.push_str(LINE2);
        text.push('\n');
        text.push_str(LINE3);
        text.push('\n');
    }
    text
}

#[test]
fn converts_a_well_formed_file_and_reports_counts() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("sample.c");
    let dest = dir.path().join("sample.parquet");
    std::fs::write(&source, sample_text(10)).unwrap();

    let report =
        convert_csf_text_to_parquet(&source, &dest, &ConvertConfig::default()).unwrap();
    assert_eq!(report.rows_written, 10);
    assert_eq!(report.rows_skipped, 0);
    assert_eq!(report.row_groups, 1);
    assert_eq!(report.lines_read, 35);
    assert!(report.issues.is_empty());
    assert!(dest.exists());
    assert!(!dir.path().join("sample.parquet.tmp").exists());
}

#[test]
fn separators_and_blank_lines_between_records_are_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("sample.c");
    let dest = dir.path().join("sample.parquet");
    let mut text = header();
    for i in 0..4 {
        if i > 0 {
            text.push_str(" *\n\n");
        }
        text.push_str(&format!("{LINE1}\n{LINE2}\n{LINE3}\n"));
    }
    text.push_str("*\n");
    std::fs::write(&source, text).unwrap();

    let report =
        convert_csf_text_to_parquet(&source, &dest, &ConvertConfig::default()).unwrap();
    assert_eq!(report.rows_written, 4);
    assert_eq!(report.rows_skipped, 0);
}

#[test]
fn footer_metadata_describes_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("sample.c");
    let dest = dir.path().join("sample.parquet");
    std::fs::write(&source, sample_text(10)).unwrap();
    convert_csf_text_to_parquet(&source, &dest, &ConvertConfig::default()).unwrap();

    let info = inspect(&dest).unwrap();
    assert_eq!(info.row_count, 10);
    assert_eq!(info.row_groups, 1);
    assert_eq!(info.peel_subshells, peel());
    assert_eq!(info.header_lines.len(), 5);
    assert_eq!(info.header_lines[2], "Peel subshells:");
    // csf_index + 3 columns per orbital + j_total + parity.
    assert_eq!(info.column_defs.len(), 21);
    assert_eq!(info.column_defs[0].name, "csf_index");
    assert_eq!(info.column_defs[1].name, "5s_occ");
    assert_eq!(info.column_defs[1].kind, PrimitiveKind::Int64);
    assert!(info.compression.contains("zstd"));
    assert!(info.file_size_bytes > 0);
}

#[test]
fn rows_read_back_typed_and_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("sample.c");
    let dest = dir.path().join("sample.parquet");
    std::fs::write(&source, sample_text(5)).unwrap();
    convert_csf_text_to_parquet(&source, &dest, &ConvertConfig::default()).unwrap();

    let reader = CsfRowReader::open(&dest).unwrap();
    assert_eq!(reader.header().peel_subshells, peel());
    let rows: Vec<_> = reader.map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 5);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.values[0], FieldValue::Int(i as i64));
        // j_total and parity sit in the last two columns.
        assert_eq!(row.values[19], FieldValue::Float(4.0));
        assert_eq!(row.values[20], FieldValue::Str("-".to_string()));
    }
}

#[test]
fn csf_text_is_reconstructed_from_storage() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("sample.c");
    let dest = dir.path().join("sample.parquet");
    std::fs::write(&source, sample_text(10)).unwrap();
    convert_csf_text_to_parquet(&source, &dest, &ConvertConfig::default()).unwrap();

    let lines = CsfRowReader::open(&dest).unwrap().read_csf_lines(None).unwrap();
    assert_eq!(lines.len(), 10);
    assert_eq!(lines[0].0, LINE1);
    assert!(lines[0].2.trim_end().ends_with("4-"));

    let limited = CsfRowReader::open(&dest).unwrap().read_csf_lines(Some(3)).unwrap();
    assert_eq!(limited.len(), 3);
    assert_eq!(limited[0], lines[0]);
}

#[test]
fn abort_policy_fails_fast_and_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bad.c");
    let dest = dir.path().join("bad.parquet");
    std::fs::write(&source, text_with_bad_record(5, 2)).unwrap();

    let err =
        convert_csf_text_to_parquet(&source, &dest, &ConvertConfig::default()).unwrap_err();
    assert!(matches!(err, RcsfsError::FieldParse { .. }));
    assert!(!dest.exists());
    assert!(!dir.path().join("bad.parquet.tmp").exists());
}

#[test]
fn collect_policy_keeps_good_rows_and_pins_the_bad_line() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("big.c");
    let dest = dir.path().join("big.parquet");
    std::fs::write(&source, text_with_bad_record(1000, 500)).unwrap();

    let config = ConvertConfig {
        on_parse_error: ParseErrorPolicy::Collect,
        ..Default::default()
    };
    let report = convert_csf_text_to_parquet(&source, &dest, &config).unwrap();
    assert_eq!(report.rows_written, 999);
    assert_eq!(report.rows_skipped, 1);
    assert_eq!(report.issues.len(), 1);
    // 5 preamble lines, then 3 lines per record: record 500 opens on 1506.
    assert_eq!(report.issues[0].line, 1506);
    assert!(report.issues[0].message.contains("\"x\""));

    // The skipped record keeps its source ordinal: the index jumps over it.
    let rows: Vec<_> = CsfRowReader::open(&dest).unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 999);
    assert_eq!(rows[499].values[0], FieldValue::Int(499));
    assert_eq!(rows[500].values[0], FieldValue::Int(501));
}

#[test]
fn skip_row_policy_counts_without_collecting() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bad.c");
    let dest = dir.path().join("bad.parquet");
    std::fs::write(&source, text_with_bad_record(10, 0)).unwrap();

    let config = ConvertConfig {
        on_parse_error: ParseErrorPolicy::SkipRow,
        ..Default::default()
    };
    let report = convert_csf_text_to_parquet(&source, &dest, &config).unwrap();
    assert_eq!(report.rows_written, 9);
    assert_eq!(report.rows_skipped, 1);
    assert!(report.issues.is_empty());
}

#[test]
fn row_groups_split_at_the_configured_row_count() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("sample.c");
    let dest = dir.path().join("sample.parquet");
    std::fs::write(&source, sample_text(25)).unwrap();

    let config = ConvertConfig {
        row_group_rows: 10,
        compression: CompressionCodec::Snappy,
        ..Default::default()
    };
    let report = convert_csf_text_to_parquet(&source, &dest, &config).unwrap();
    assert_eq!(report.rows_written, 25);
    assert_eq!(report.row_groups, 3);

    let info = inspect(&dest).unwrap();
    assert_eq!(info.row_count, 25);
    assert_eq!(info.row_groups, 3);
    assert!(info.compression.contains("snappy"));
}

#[test]
fn overlong_lines_are_truncated_and_counted() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("long.c");
    let dest = dir.path().join("long.parquet");
    let mut text = sample_text(3);
    text.push_str(&"x".repeat(300));
    text.push('\n');
    std::fs::write(&source, text).unwrap();

    let config = ConvertConfig {
        max_line_len: 64,
        on_parse_error: ParseErrorPolicy::Collect,
        ..Default::default()
    };
    let report = convert_csf_text_to_parquet(&source, &dest, &config).unwrap();
    assert_eq!(report.rows_written, 3);
    assert_eq!(report.truncated_lines, 1);
    // The clipped garbage line is a continuation outside any record.
    assert_eq!(report.rows_skipped, 1);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].line, 15);
}

#[test]
fn cancelled_job_aborts_at_the_flush_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("cancelled.parquet");

    let token = CancelToken::new();
    token.cancel();
    let config = ConvertConfig {
        row_group_rows: 4,
        ..Default::default()
    };
    let err = convert_csf_reader(
        Cursor::new(sample_text(10).into_bytes()),
        &dest,
        &config,
        Some(&token),
    )
    .unwrap_err();
    assert!(matches!(err, RcsfsError::Cancelled { rows_flushed: 0 }));
    assert!(!dest.exists());
    assert!(!dir.path().join("cancelled.parquet.tmp").exists());
}

#[test]
fn cancelled_parallel_job_aborts_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("sample.c");
    let dest = dir.path().join("cancelled.parquet");
    std::fs::write(&source, sample_text(20)).unwrap();

    let token = CancelToken::new();
    token.cancel();
    let config = ConvertConfig {
        row_group_rows: 4,
        ..Default::default()
    };
    let err = convert_csf_text_to_parquet_parallel(
        &source,
        &dest,
        &config,
        Some(2),
        Some(&token),
    )
    .unwrap_err();
    assert!(matches!(err, RcsfsError::Cancelled { .. }));
    assert!(!dest.exists());
    assert!(!dir.path().join("cancelled.parquet.tmp").exists());
}

#[test]
fn non_ascii_garbage_record_is_recovered_per_policy() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("utf8.c");
    let dest = dir.path().join("utf8.parquet");
    let mut text = sample_text(3);
    // Parenthesis bytes line up, but the label region is multibyte.
    text.push_str("\u{20ac}a ( 2)\n");
    text.push_str(LINE2);
    text.push('\n');
    text.push_str(LINE3);
    text.push('\n');
    std::fs::write(&source, text).unwrap();

    let config = ConvertConfig {
        on_parse_error: ParseErrorPolicy::Collect,
        ..Default::default()
    };
    let report = convert_csf_text_to_parquet(&source, &dest, &config).unwrap();
    assert_eq!(report.rows_written, 3);
    assert_eq!(report.rows_skipped, 1);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].line, 15);
}

#[test]
fn parallel_conversion_matches_the_sequential_output() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("sample.c");
    std::fs::write(&source, sample_text(100)).unwrap();
    let seq_dest = dir.path().join("seq.parquet");
    let par_dest = dir.path().join("par.parquet");

    let config = ConvertConfig {
        row_group_rows: 16,
        ..Default::default()
    };
    let seq = convert_csf_text_to_parquet(&source, &seq_dest, &config).unwrap();
    let par =
        convert_csf_text_to_parquet_parallel(&source, &par_dest, &config, Some(2), None)
            .unwrap();
    assert_eq!(seq.rows_written, par.rows_written);
    assert_eq!(seq.row_groups, par.row_groups);

    let seq_rows: Vec<_> = CsfRowReader::open(&seq_dest).unwrap().map(|r| r.unwrap()).collect();
    let par_rows: Vec<_> = CsfRowReader::open(&par_dest).unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(seq_rows, par_rows);
}

#[test]
fn conversion_is_deterministic_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("sample.c");
    std::fs::write(&source, sample_text(20)).unwrap();
    let first = dir.path().join("first.parquet");
    let second = dir.path().join("second.parquet");

    let config = ConvertConfig::default();
    convert_csf_text_to_parquet(&source, &first, &config).unwrap();
    convert_csf_text_to_parquet(&source, &second, &config).unwrap();
    assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
}

#[test]
fn header_only_file_produces_an_empty_output() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("empty.c");
    let dest = dir.path().join("empty.parquet");
    std::fs::write(&source, header()).unwrap();

    let report =
        convert_csf_text_to_parquet(&source, &dest, &ConvertConfig::default()).unwrap();
    assert_eq!(report.rows_written, 0);
    assert!(dest.exists());

    let info = inspect(&dest).unwrap();
    assert_eq!(info.row_count, 0);
    assert_eq!(info.row_groups, 0);
    assert_eq!(info.peel_subshells, peel());
}

#[test]
fn missing_source_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.parquet");
    let err = convert_csf_text_to_parquet(
        Path::new("/no/such/listing.c"),
        &dest,
        &ConvertConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, RcsfsError::Io(_)));
}

#[test]
fn invalid_config_is_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("sample.c");
    let dest = dir.path().join("out.parquet");
    std::fs::write(&source, sample_text(2)).unwrap();

    let config = ConvertConfig {
        row_group_rows: 0,
        ..Default::default()
    };
    let err = convert_csf_text_to_parquet(&source, &dest, &config).unwrap_err();
    assert!(matches!(err, RcsfsError::Config(_)));
    assert!(!dest.exists());
}

#[test]
fn schema_is_inferred_when_the_preamble_declares_no_peel_list() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bare.c");
    let dest = dir.path().join("bare.parquet");
    let mut text = "Relativistic CSF listing\ngenerated for testing\n".to_string();
    for _ in 0..6 {
        text.push_str(&format!("{LINE1}\n{LINE2}\n{LINE3}\n"));
    }
    std::fs::write(&source, text).unwrap();

    let config = ConvertConfig {
        header_lines: 2,
        infer_records: 4,
        ..Default::default()
    };
    let report = convert_csf_text_to_parquet(&source, &dest, &config).unwrap();
    assert_eq!(report.rows_written, 6);

    let info = inspect(&dest).unwrap();
    assert_eq!(info.peel_subshells, peel());
    assert_eq!(info.header_lines.len(), 2);
    assert_eq!(info.column_defs[1].name, "5s_occ");
    assert_eq!(info.column_defs[1].kind, PrimitiveKind::Int64);
    let jsub = info
        .column_defs
        .iter()
        .find(|c| c.name == "5s_jsub")
        .unwrap();
    assert_eq!(jsub.kind, PrimitiveKind::Float64);
    assert!(jsub.nullable);

    let lines = CsfRowReader::open(&dest).unwrap().read_csf_lines(None).unwrap();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0].0, LINE1);
}

#[test]
fn truncated_record_at_end_of_input_follows_the_policy() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("cut.c");
    let dest = dir.path().join("cut.parquet");
    let mut text = sample_text(2);
    text.push_str(LINE1);
    text.push('\n'); // record cut off after its first line
    std::fs::write(&source, text).unwrap();

    let err =
        convert_csf_text_to_parquet(&source, &dest, &ConvertConfig::default()).unwrap_err();
    assert!(matches!(err, RcsfsError::MalformedRecord { line: 12, .. }));

    let config = ConvertConfig {
        on_parse_error: ParseErrorPolicy::Collect,
        ..Default::default()
    };
    let report = convert_csf_text_to_parquet(&source, &dest, &config).unwrap();
    assert_eq!(report.rows_written, 2);
    assert_eq!(report.rows_skipped, 1);
    assert_eq!(report.issues[0].line, 12);
}
