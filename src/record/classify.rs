//! Stateful, line-at-a-time classification of a CSF text stream.
//!
//! The [`LineClassifier`] consumes the configured preamble first (scanning it
//! for the peel subshell declaration), then tags each body line. The
//! [`RecordAssembler`] groups an occupation line and its two continuation
//! lines into one [`RawCsfRecord`]; records cut short by a separator, a new
//! occupation line, or end of input surface as `MalformedRecord` and are left
//! to the orchestrator's parse-error policy.

use crate::error::RcsfsError;
use crate::record::{RawCsfRecord, WINDOW_WIDTH};

/// Classification tag for one physical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Preamble line, preserved verbatim in the output footer metadata.
    Header,
    /// First line of a logical record (per-orbital occupations).
    Occupation,
    /// Second or third line of a logical record.
    Continuation,
    /// A `*` block separator between records.
    BlockSeparator,
    /// Whitespace-only line.
    Blank,
}

/// Marker line that introduces the peel subshell list in a GRASP preamble.
const PEEL_MARKER: &str = "Peel subshells:";

/// Recognizes record types and structural markers without materializing the
/// whole file. Its only side effect is the line counter used in diagnostics.
#[derive(Debug)]
pub struct LineClassifier {
    header_remaining: usize,
    line_no: u64,
    header_lines: Vec<String>,
    peel_subshells: Option<Vec<String>>,
    awaiting_peel_list: bool,
}

impl LineClassifier {
    pub fn new(header_lines: usize) -> Self {
        Self {
            header_remaining: header_lines,
            line_no: 0,
            header_lines: Vec::with_capacity(header_lines),
            peel_subshells: None,
            awaiting_peel_list: false,
        }
    }

    /// 1-based number of the most recently classified line.
    pub fn line_no(&self) -> u64 {
        self.line_no
    }

    /// The preamble lines seen so far, verbatim.
    pub fn header(&self) -> &[String] {
        &self.header_lines
    }

    /// The peel subshell list declared in the preamble, if one was found.
    pub fn peel_subshells(&self) -> Option<&[String]> {
        self.peel_subshells.as_deref()
    }

    /// Classify the next physical line.
    pub fn classify(&mut self, line: &str) -> Result<LineKind, RcsfsError> {
        self.line_no += 1;

        if self.header_remaining > 0 {
            self.header_remaining -= 1;
            if self.awaiting_peel_list {
                self.peel_subshells =
                    Some(line.split_whitespace().map(str::to_string).collect());
                self.awaiting_peel_list = false;
            } else if line.trim() == PEEL_MARKER {
                self.awaiting_peel_list = true;
            }
            self.header_lines.push(line.to_string());
            return Ok(LineKind::Header);
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(LineKind::Blank);
        }
        if trimmed == "*" {
            return Ok(LineKind::BlockSeparator);
        }
        if is_occupation_line(line) {
            return Ok(LineKind::Occupation);
        }
        Ok(LineKind::Continuation)
    }
}

/// An occupation line is a run of 9-character windows shaped `  5s ( 2)`.
/// Checking the first window's parentheses is enough to separate it from the
/// continuation lines, which carry bare J tokens.
fn is_occupation_line(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.len() >= WINDOW_WIDTH && bytes[5] == b'(' && bytes[8] == b')'
}

#[derive(Debug)]
struct PartialRecord {
    line: u64,
    occupation: String,
    continuations: Vec<String>,
}

/// Groups classified lines into three-line logical records.
#[derive(Debug, Default)]
pub struct RecordAssembler {
    pending: Option<PartialRecord>,
    next_index: u64,
}

impl RecordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one classified body line. Returns a completed record when the
    /// third line of a cycle arrives. A record interrupted before its third
    /// line is dropped and reported as malformed; when the interruption is a
    /// new occupation line, that line still opens the next record.
    pub fn push(
        &mut self,
        kind: LineKind,
        line: &str,
        line_no: u64,
    ) -> Result<Option<RawCsfRecord>, RcsfsError> {
        match kind {
            LineKind::Header => Ok(None),
            LineKind::Occupation => {
                let interrupted = self.pending.replace(PartialRecord {
                    line: line_no,
                    occupation: line.to_string(),
                    continuations: Vec::with_capacity(2),
                });
                match interrupted {
                    Some(partial) => Err(truncated(&partial)),
                    None => Ok(None),
                }
            }
            LineKind::Continuation => match self.pending.as_mut() {
                None => Err(RcsfsError::MalformedRecord {
                    line: line_no,
                    reason: "continuation line outside of a record".to_string(),
                }),
                Some(partial) => {
                    partial.continuations.push(line.to_string());
                    if partial.continuations.len() == 2 {
                        let partial = self.pending.take().expect("pending record present");
                        let mut lines = partial.continuations.into_iter();
                        let record = RawCsfRecord {
                            index: self.next_index,
                            line: partial.line,
                            occupation: partial.occupation,
                            coupling: lines.next().expect("two continuations collected"),
                            final_j: lines.next().expect("two continuations collected"),
                        };
                        self.next_index += 1;
                        Ok(Some(record))
                    } else {
                        Ok(None)
                    }
                }
            },
            LineKind::BlockSeparator | LineKind::Blank => match self.pending.take() {
                Some(partial) => Err(truncated(&partial)),
                None => Ok(None),
            },
        }
    }

    /// Signal end of input. A record still open at this point is malformed.
    pub fn finish(&mut self) -> Result<(), RcsfsError> {
        match self.pending.take() {
            Some(partial) => Err(truncated(&partial)),
            None => Ok(()),
        }
    }

    /// Number of complete records produced so far.
    pub fn completed(&self) -> u64 {
        self.next_index
    }
}

fn truncated(partial: &PartialRecord) -> RcsfsError {
    RcsfsError::MalformedRecord {
        line: partial.line,
        reason: format!(
            "record truncated: expected 3 lines, got {}",
            1 + partial.continuations.len()
        ),
    }
}
