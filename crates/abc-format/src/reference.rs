//! Pulling one tune out of a tune book by its `X:` number.

use crate::error::{AbcError, Result};

fn reference_field(line: &str) -> Option<&str> {
    line.trim_start().strip_prefix("X:").map(str::trim)
}

/// Text of the tune numbered `number`, from its `X:` line up to the next.
///
/// An exact match on the field text wins; otherwise numbers compare as
/// integers, so `X:007` is found by `"7"`.
pub fn extract_reference_number(text: &str, number: &str) -> Result<String> {
    let number = number.trim();
    let lines: Vec<&str> = text.lines().collect();
    let starts: Vec<(usize, &str)> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| reference_field(line).map(|field| (i, field)))
        .collect();

    let wanted = number.parse::<u64>().ok();
    let start = starts
        .iter()
        .find(|(_, field)| *field == number)
        .or_else(|| {
            starts.iter().find(|(_, field)| {
                wanted.is_some() && field.parse::<u64>().ok() == wanted
            })
        })
        .map(|(i, _)| *i)
        .ok_or_else(|| AbcError::ReferenceNumberNotFound {
            number: number.to_string(),
        })?;

    let end = starts
        .iter()
        .map(|(i, _)| *i)
        .find(|i| *i > start)
        .unwrap_or(lines.len());
    Ok(lines[start..end].join("\n"))
}
