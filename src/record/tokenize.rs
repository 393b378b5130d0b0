//! Splits an assembled three-line CSF record into typed field values.
//!
//! The CSF dialect is positional: the occupation line is a run of 9-character
//! windows (`  5s ( 2)`), and the two continuation lines carry J tokens
//! aligned under those windows. The final token of the third line is always
//! the record's total J with an optional parity sign.

use crate::error::RcsfsError;
use crate::record::RawCsfRecord;
use crate::schema::{FieldValue, PrimitiveKind};

/// Width of one orbital window on every line of a record.
pub const WINDOW_WIDTH: usize = 9;

/// Typed fields for one orbital of one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitalFields {
    /// Electron count; zero for peel orbitals the record does not list.
    pub occ: i64,
    /// Intermediate J of the subshell, when the record carries one.
    pub j_sub: Option<f64>,
    /// Coupling J accumulated at this orbital, when the record carries one.
    pub j_coup: Option<f64>,
}

/// One fully tokenized record, orbitals in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizedRecord {
    /// 0-based ordinal within the file body.
    pub index: i64,
    /// 1-based line number of the occupation line.
    pub line: u64,
    pub orbitals: Vec<(String, OrbitalFields)>,
    pub j_total: f64,
    /// `"+"` or `"-"`.
    pub parity: String,
}

impl TokenizedRecord {
    /// Field values in schema column order (see `CsfSchema::declared`).
    pub fn values(&self) -> Vec<FieldValue> {
        let mut out = Vec::with_capacity(3 + 3 * self.orbitals.len());
        out.push(FieldValue::Int(self.index));
        for (_, fields) in &self.orbitals {
            out.push(FieldValue::Int(fields.occ));
            out.push(fields.j_sub.map(FieldValue::Float).unwrap_or(FieldValue::Null));
            out.push(fields.j_coup.map(FieldValue::Float).unwrap_or(FieldValue::Null));
        }
        out.push(FieldValue::Float(self.j_total));
        out.push(FieldValue::Str(self.parity.clone()));
        out
    }

    /// `(column name, value)` pairs for schema inference.
    pub fn named_fields(&self) -> Vec<(String, FieldValue)> {
        let mut names = Vec::with_capacity(3 + 3 * self.orbitals.len());
        names.push("csf_index".to_string());
        for (label, _) in &self.orbitals {
            names.push(format!("{label}_occ"));
            names.push(format!("{label}_jsub"));
            names.push(format!("{label}_jcoup"));
        }
        names.push("j_total".to_string());
        names.push("parity".to_string());
        names.into_iter().zip(self.values()).collect()
    }

    /// The orbital labels this record was tokenized against, in order.
    pub fn labels(&self) -> Vec<String> {
        self.orbitals.iter().map(|(label, _)| label.clone()).collect()
    }
}

/// Converts raw records into [`TokenizedRecord`]s.
///
/// With a peel list (the common case: declared in the file preamble) the
/// output orbitals follow peel order, absent orbitals filled with zero
/// occupation; labels not in the peel list are a field error. Without a peel
/// list the tokenizer runs in discovery mode and emits orbitals in the
/// record's own window order, which the schema inference then pins down.
#[derive(Debug, Clone)]
pub struct FieldTokenizer {
    peel: Option<Vec<String>>,
}

impl FieldTokenizer {
    pub fn with_peel(peel: Vec<String>) -> Self {
        Self { peel: Some(peel) }
    }

    pub fn discover() -> Self {
        Self { peel: None }
    }

    pub fn tokenize(&self, record: &RawCsfRecord) -> Result<TokenizedRecord, RcsfsError> {
        let windows = parse_occupation_line(&record.occupation, record.line)?;
        if windows.is_empty() {
            return Err(RcsfsError::MalformedRecord {
                line: record.line,
                reason: "occupation line has no orbital windows".to_string(),
            });
        }

        let j_sub = parse_subshell_j_line(&record.coupling, record.line + 1, windows.len())?;
        let (j_coup, j_total, parity) =
            parse_final_line(&record.final_j, record.line + 2, windows.len())?;

        let orbitals = match &self.peel {
            None => windows
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    (
                        w.label.clone(),
                        OrbitalFields {
                            occ: w.occ,
                            j_sub: j_sub[k],
                            j_coup: j_coup[k],
                        },
                    )
                })
                .collect(),
            Some(peel) => {
                let mut fields = vec![
                    OrbitalFields {
                        occ: 0,
                        j_sub: None,
                        j_coup: None,
                    };
                    peel.len()
                ];
                let mut seen = vec![false; peel.len()];
                for (k, w) in windows.iter().enumerate() {
                    let pos = peel.iter().position(|p| *p == w.label).ok_or_else(|| {
                        RcsfsError::FieldParse {
                            line: record.line,
                            column: k * WINDOW_WIDTH + 3,
                            token: w.label.clone(),
                            expected: PrimitiveKind::Utf8,
                        }
                    })?;
                    if seen[pos] {
                        return Err(RcsfsError::MalformedRecord {
                            line: record.line,
                            reason: format!("orbital {:?} listed twice", w.label),
                        });
                    }
                    seen[pos] = true;
                    fields[pos] = OrbitalFields {
                        occ: w.occ,
                        j_sub: j_sub[k],
                        j_coup: j_coup[k],
                    };
                }
                peel.iter().cloned().zip(fields).collect()
            }
        };

        Ok(TokenizedRecord {
            index: record.index as i64,
            line: record.line,
            orbitals,
            j_total,
            parity,
        })
    }
}

#[derive(Debug)]
struct OccupationWindow {
    label: String,
    occ: i64,
}

/// Split the occupation line into its 9-character windows and parse each
/// `  5s ( 2)` into a label and an electron count.
fn parse_occupation_line(line: &str, line_no: u64) -> Result<Vec<OccupationWindow>, RcsfsError> {
    let effective = line.trim_end();
    let mut windows = Vec::new();
    let mut start = 0;
    while start < effective.len() {
        let window = effective.get(start..start + WINDOW_WIDTH).ok_or_else(|| {
            RcsfsError::MalformedRecord {
                line: line_no,
                reason: format!("occupation line cut mid-window at column {}", start + 1),
            }
        })?;
        // The dialect is ASCII; anything else would break the byte-offset
        // window layout.
        if !window.is_ascii() {
            return Err(RcsfsError::MalformedRecord {
                line: line_no,
                reason: format!("non-ASCII text in window {window:?}"),
            });
        }
        let bytes = window.as_bytes();
        if bytes[5] != b'(' || bytes[8] != b')' {
            return Err(RcsfsError::MalformedRecord {
                line: line_no,
                reason: format!("window {window:?} is not shaped '  nl (ee)'"),
            });
        }
        let label = window[2..5].trim().to_string();
        if label.is_empty() {
            return Err(RcsfsError::MalformedRecord {
                line: line_no,
                reason: format!("empty orbital label in window at column {}", start + 1),
            });
        }
        let occ_token = window[6..8].trim();
        let occ = occ_token.parse::<i64>().map_err(|_| RcsfsError::FieldParse {
            line: line_no,
            column: start + 7,
            token: occ_token.to_string(),
            expected: PrimitiveKind::Int64,
        })?;
        windows.push(OccupationWindow { label, occ });
        start += WINDOW_WIDTH;
    }
    Ok(windows)
}

/// Parse the intermediate-J line. Tokens are whitespace-delimited and
/// assigned to the window containing their first character, so a token
/// straddling a window boundary is never split.
fn parse_subshell_j_line(
    line: &str,
    line_no: u64,
    num_windows: usize,
) -> Result<Vec<Option<f64>>, RcsfsError> {
    let mut out = vec![None; num_windows];
    for &(pos, token) in &tokens_with_positions(line) {
        let window = pos / WINDOW_WIDTH;
        if window >= num_windows {
            return Err(RcsfsError::MalformedRecord {
                line: line_no,
                reason: format!("subshell J token {token:?} outside the orbital windows"),
            });
        }
        if out[window].is_some() {
            return Err(RcsfsError::MalformedRecord {
                line: line_no,
                reason: format!("two subshell J tokens in the window at column {}", pos + 1),
            });
        }
        out[window] = Some(parse_j(token).ok_or_else(|| RcsfsError::FieldParse {
            line: line_no,
            column: pos + 1,
            token: token.to_string(),
            expected: PrimitiveKind::Float64,
        })?);
    }
    Ok(out)
}

/// Parse the third line: per-window coupling J tokens plus the trailing
/// total J / parity token, which by convention is the last token on the line.
fn parse_final_line(
    line: &str,
    line_no: u64,
    num_windows: usize,
) -> Result<(Vec<Option<f64>>, f64, String), RcsfsError> {
    let tokens = tokens_with_positions(line);
    let Some((final_pos, final_token)) = tokens.last().copied() else {
        return Err(RcsfsError::FieldParse {
            line: line_no,
            column: line.len() + 1,
            token: String::new(),
            expected: PrimitiveKind::Float64,
        });
    };

    let (j_text, parity) = match final_token.as_bytes().last() {
        Some(b'-') => (&final_token[..final_token.len() - 1], "-"),
        Some(b'+') => (&final_token[..final_token.len() - 1], "+"),
        _ => (final_token, "+"),
    };
    let j_total = parse_j(j_text).ok_or_else(|| RcsfsError::FieldParse {
        line: line_no,
        column: final_pos + 1,
        token: final_token.to_string(),
        expected: PrimitiveKind::Float64,
    })?;

    let mut j_coup = vec![None; num_windows];
    for &(pos, token) in &tokens[..tokens.len() - 1] {
        let window = pos / WINDOW_WIDTH;
        if window >= num_windows {
            return Err(RcsfsError::MalformedRecord {
                line: line_no,
                reason: format!("coupling token {token:?} outside the orbital windows"),
            });
        }
        if j_coup[window].is_some() {
            return Err(RcsfsError::MalformedRecord {
                line: line_no,
                reason: format!("two coupling tokens in the window at column {}", pos + 1),
            });
        }
        j_coup[window] = Some(parse_j(token).ok_or_else(|| RcsfsError::FieldParse {
            line: line_no,
            column: pos + 1,
            token: token.to_string(),
            expected: PrimitiveKind::Float64,
        })?);
    }
    Ok((j_coup, j_total, parity.to_string()))
}

/// Whitespace-separated tokens with their 0-based character positions.
fn tokens_with_positions(line: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                tokens.push((s, &line[s..i]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push((s, &line[s..]));
    }
    tokens
}

/// Parse a J quantum number: an integer (`2`) or a half-integer written as a
/// fraction over two (`3/2`).
fn parse_j(token: &str) -> Option<f64> {
    match token.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<i64>().ok()?;
            let den = den.trim().parse::<i64>().ok()?;
            if den != 2 {
                return None;
            }
            Some(num as f64 / 2.0)
        }
        None => token.parse::<i64>().ok().map(|v| v as f64),
    }
}
