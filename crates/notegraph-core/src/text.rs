//! Character-offset view over a source note.
//!
//! Model output reports spans in characters. Rust strings index by byte, so
//! every span lookup goes through this table.

/// Source text with a char-offset → byte-offset table.
#[derive(Debug, Clone)]
pub struct SourceText<'a> {
    text: &'a str,
    /// `offsets[i]` is the byte offset of char `i`; the last entry is `text.len()`.
    offsets: Vec<usize>,
}

impl<'a> SourceText<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        offsets.push(text.len());
        Self { text, offsets }
    }

    pub fn as_str(&self) -> &'a str {
        self.text
    }

    /// Length in characters.
    pub fn len_chars(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Byte offset of a char offset, if within bounds (`== len_chars` allowed).
    pub fn byte_offset(&self, char_idx: usize) -> Option<usize> {
        self.offsets.get(char_idx).copied()
    }

    /// Char offset of a byte offset that falls on a char boundary.
    pub fn char_offset(&self, byte_idx: usize) -> Option<usize> {
        self.offsets.binary_search(&byte_idx).ok()
    }

    /// True when `0 <= start < end <= len_chars`.
    pub fn is_valid_span(&self, start: usize, end: usize) -> bool {
        start < end && end <= self.len_chars()
    }

    /// Substring for a char span, `None` when out of bounds or empty.
    pub fn slice(&self, start: usize, end: usize) -> Option<&'a str> {
        if !self.is_valid_span(start, end) {
            return None;
        }
        Some(&self.text[self.offsets[start]..self.offsets[end]])
    }

    /// Character at a char offset.
    pub fn char_at(&self, idx: usize) -> Option<char> {
        let start = self.byte_offset(idx)?;
        self.text[start..].chars().next()
    }

    /// Char offsets of every (possibly overlapping) exact occurrence of `needle`.
    pub fn find_all(&self, needle: &str) -> Vec<usize> {
        if needle.is_empty() {
            return Vec::new();
        }
        let mut found = Vec::new();
        let mut from = 0;
        while let Some(pos) = self.text[from..].find(needle) {
            let byte_idx = from + pos;
            if let Some(char_idx) = self.char_offset(byte_idx) {
                found.push(char_idx);
            }
            // Advance one char so overlapping occurrences are still seen.
            let step = self.text[byte_idx..]
                .chars()
                .next()
                .map(|c| c.len_utf8())
                .unwrap_or(1);
            from = byte_idx + step;
        }
        found
    }

    /// Span of a regex-style byte match converted to chars.
    pub fn char_span(&self, byte_start: usize, byte_end: usize) -> Option<(usize, usize)> {
        Some((self.char_offset(byte_start)?, self.char_offset(byte_end)?))
    }
}

/// True when `[a_start, a_end)` and `[b_start, b_end)` share at least one char.
pub fn spans_overlap(a_start: usize, a_end: usize, b_start: usize, b_end: usize) -> bool {
    a_start < b_end && b_start < a_end
}
