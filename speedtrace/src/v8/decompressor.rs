//! Back-reference decompression for V8 logs.
//!
//! After a `profiler,"compression",N` line, the log keeps a window of the
//! last `N` lines. A later line may end in `#L` or `#L:C`, meaning "replace
//! this suffix with line `L` back in the window, starting at character
//! `C`". Profiler lines are never windowed, and `repeat` lines are windowed
//! without their `repeat,N,` prefix.

use super::LogLineError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum SplitState {
    LookingForComma,
    InString,
    InEscape,
}

/// Splits a log line at top-level commas, keeping quotes in place.
///
/// A trailing comma does not produce an empty last field.
pub fn split_log_line(line: &str) -> Vec<&str> {
    let mut results = Vec::new();
    let mut state = SplitState::LookingForComma;
    let mut entry_start = 0;

    for (index, c) in line.char_indices() {
        state = match (state, c) {
            (SplitState::LookingForComma, ',') => {
                results.push(&line[entry_start..index]);
                entry_start = index + 1;
                SplitState::LookingForComma
            }
            (SplitState::LookingForComma, '"') => SplitState::InString,
            (SplitState::InString, '\\') => SplitState::InEscape,
            (SplitState::InString, '"') => SplitState::LookingForComma,
            (SplitState::InEscape, _) => SplitState::InString,
            (state, _) => state,
        };
    }

    if entry_start != line.len() {
        results.push(&line[entry_start..]);
    }
    results
}

/// Splits a decompressed line into owned fields with quotes removed.
///
/// Escaped characters keep their backslash. The last field is always
/// present, so `"a,"` yields `["a", ""]`.
pub fn split_fields(line: &str) -> Vec<String> {
    let mut results = Vec::new();
    let mut field = String::new();
    let mut state = SplitState::LookingForComma;

    for c in line.chars() {
        match state {
            SplitState::LookingForComma => match c {
                ',' => results.push(std::mem::take(&mut field)),
                '"' => state = SplitState::InString,
                _ => field.push(c),
            },
            SplitState::InString => match c {
                '"' => state = SplitState::LookingForComma,
                '\\' => {
                    state = SplitState::InEscape;
                    field.push(c);
                }
                _ => field.push(c),
            },
            SplitState::InEscape => {
                state = SplitState::InString;
                field.push(c);
            }
        }
    }

    results.push(field);
    results
}

/// Sliding window of recent log lines.
#[derive(Debug, Clone)]
pub struct LogDecompressor {
    window: Vec<Option<String>>,
    last: usize,
}

impl LogDecompressor {
    pub fn new(window_size: usize) -> Self {
        Self {
            window: vec![None; window_size],
            last: 0,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    /// Expands any back-reference in `line` and records the result in the
    /// window.
    pub fn decompress(&mut self, line: &str) -> Result<String, LogLineError> {
        let mut expanded = line.to_string();

        if !self.window.is_empty() {
            if let Some(hash) = line.find('#') {
                if !line.ends_with('"') {
                    let reference = &line[hash + 1..];
                    let (line_offset, char_offset) = parse_back_reference(reference)?;
                    let target = self.back_reference(line_offset)?;
                    let tail = target
                        .get(char_offset..)
                        .ok_or_else(|| LogLineError::BadBackReference(reference.to_string()))?;
                    expanded = format!("{}{}", &line[..hash], tail);
                }
            }
        }

        let fields = split_log_line(&expanded);
        match fields.first().copied() {
            None | Some("profiler") => {}
            Some(command @ ("repeat" | "r")) => {
                if let Some(count) = fields.get(1) {
                    let prefix = command.len() + count.len() + 2;
                    if let Some(rest) = expanded.get(prefix..) {
                        self.append(rest.to_string());
                    }
                }
            }
            Some(_) => self.append(expanded.clone()),
        }

        Ok(expanded)
    }

    fn append(&mut self, line: String) {
        if self.window.is_empty() {
            return;
        }
        self.last = (self.last + 1) % self.window.len();
        self.window[self.last] = Some(line);
    }

    /// Line `index` back from the most recent one, where 1 is the most
    /// recent.
    fn back_reference(&self, index: usize) -> Result<&str, LogLineError> {
        let size = self.window.len() as i64;
        let mut slot = (self.last as i64 - (index as i64 - 1)) % size;
        if slot < 0 {
            slot += size;
        }
        self.window[slot as usize]
            .as_deref()
            .ok_or(LogLineError::BackReferenceOutOfWindow(index))
    }
}

fn parse_back_reference(reference: &str) -> Result<(usize, usize), LogLineError> {
    let bad = || LogLineError::BadBackReference(reference.to_string());
    match reference.split_once(':') {
        None => Ok((reference.parse().map_err(|_| bad())?, 0)),
        Some((line, chars)) => Ok((
            line.parse().map_err(|_| bad())?,
            chars.parse().map_err(|_| bad())?,
        )),
    }
}
