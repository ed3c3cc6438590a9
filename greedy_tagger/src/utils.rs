use std::io::{self, BufRead};

/// Splits a line on tabs, dropping empty fields so that runs of tabs act as a single delimiter.
#[inline(always)]
pub fn tab_fields(line: &str) -> impl Iterator<Item = &str> {
    line.split('\t').filter(|field| !field.is_empty())
}

/// Reads one line as raw bytes, without the trailing `\n` or `\r\n`.
///
/// Returns `Ok(false)` at the end of input. Decoding is left to the caller so that a line
/// with invalid UTF-8 can be handled on its own.
pub fn read_line_bytes<R>(rdr: &mut R, buf: &mut Vec<u8>) -> io::Result<bool>
where
    R: BufRead,
{
    buf.clear();
    if rdr.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(true)
}

/// Result of a two-slot running maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopTwo {
    /// Index of the first maximum in scan order.
    pub index: usize,

    /// Maximum value.
    pub best: f64,

    /// Runner-up value. `None` when there is only one element.
    pub second: Option<f64>,
}

impl TopTwo {
    /// Gap between the maximum and the runner-up, or 0 without a runner-up.
    pub fn margin(&self) -> f64 {
        self.second.map_or(0., |second| self.best - second)
    }
}

/// Finds the maximum, its first index, and the second-highest value in one pass.
///
/// The first element seeds the maximum, so a real index is returned for any non-empty
/// input regardless of the sign of the values. Returns `None` for an empty slice.
pub fn top_two(values: &[f64]) -> Option<TopTwo> {
    let (&first, rest) = values.split_first()?;
    let mut result = TopTwo {
        index: 0,
        best: first,
        second: None,
    };
    for (i, &v) in rest.iter().enumerate() {
        if v > result.best {
            result.second = Some(result.best);
            result.best = v;
            result.index = i + 1;
        } else if result.second.map_or(true, |second| v > second) {
            result.second = Some(v);
        }
    }
    Some(result)
}
