//! Inverse of the tokenizer: renders a typed record back into the three
//! fixed-width physical lines of the CSF dialect.
//!
//! The emitted layout places every token inside its orbital window, so
//! format -> tokenize reproduces the exact field values; byte-level spacing
//! of the source file is not preserved (and does not need to be).

use crate::record::tokenize::{TokenizedRecord, WINDOW_WIDTH};

/// Render a J quantum number the way CSF listings write it: an integer when
/// whole, a fraction over two when half-integral.
pub fn format_j(j: f64) -> String {
    let twice = (2.0 * j).round() as i64;
    if twice % 2 == 0 {
        (twice / 2).to_string()
    } else {
        format!("{twice}/2")
    }
}

/// Render one record as its occupation line and two continuation lines.
pub fn format_record(record: &TokenizedRecord) -> (String, String, String) {
    // Orbitals the record actually occupies get a window; untouched peel
    // orbitals are omitted, exactly as GRASP writes them.
    let listed: Vec<_> = record
        .orbitals
        .iter()
        .filter(|(_, f)| f.occ > 0 || f.j_sub.is_some() || f.j_coup.is_some())
        .collect();
    let listed: Vec<_> = if listed.is_empty() {
        record.orbitals.iter().collect()
    } else {
        listed
    };

    let mut line1 = String::with_capacity(listed.len() * WINDOW_WIDTH);
    for (label, fields) in &listed {
        line1.push_str(&format!("  {:<3}({:>2})", label, fields.occ));
    }

    let mut line2 = vec![b' '; listed.len() * WINDOW_WIDTH];
    let mut line3 = vec![b' '; listed.len() * WINDOW_WIDTH];
    for (k, (_, fields)) in listed.iter().enumerate() {
        if let Some(j) = fields.j_sub {
            place_token(&mut line2, k, &format_j(j));
        }
        if let Some(j) = fields.j_coup {
            place_token(&mut line3, k, &format_j(j));
        }
    }

    // The total J / parity token always comes last, past the windows. The
    // buffer grows as needed; a J the tokenizer accepted must format back
    // without truncation.
    let final_token = format!("{}{}", format_j(record.j_total), record.parity);
    let final_start = listed.len() * WINDOW_WIDTH + 2;
    if line3.len() < final_start {
        line3.resize(final_start, b' ');
    } else {
        line3.push(b' ');
    }
    line3.extend_from_slice(final_token.as_bytes());

    (
        line1,
        String::from_utf8(line2).expect("ASCII line").trim_end().to_string(),
        String::from_utf8(line3).expect("ASCII line").trim_end().to_string(),
    )
}

/// Right-align a token inside window `k`, ending under the label region.
/// Tokens wider than the window spill rightward instead of overflowing.
fn place_token(buf: &mut Vec<u8>, k: usize, token: &str) {
    let end = k * WINDOW_WIDTH + 5;
    let start = end.saturating_sub(token.len()).max(k * WINDOW_WIDTH);
    if buf.len() < start + token.len() {
        buf.resize(start + token.len(), b' ');
    }
    buf[start..start + token.len()].copy_from_slice(token.as_bytes());
}
