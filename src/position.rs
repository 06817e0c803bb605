//! Source positions for diagnostics.
//!
//! The lexer and parser work with byte offsets into the input. Diagnostics
//! report 1-based line and column numbers, with columns counted in characters,
//! so that a caret can be drawn under the offending spot.

use std::fmt;

use ropey::Rope;

/// A position in the input text.
///
/// Both `line` and `column` are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// Create a new position.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Compute the position of byte `offset` within `text`.
    ///
    /// Offsets past the end of the text clamp to the end.
    pub fn from_offset(text: &str, offset: usize) -> Self {
        Self::in_rope(&Rope::from_str(text), offset)
    }

    fn in_rope(rope: &Rope, offset: usize) -> Self {
        let char_idx = rope.byte_to_char(offset.min(rope.len_bytes()));
        let line = rope.char_to_line(char_idx);
        Position::new(line + 1, char_idx - rope.line_to_char(line) + 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// An offset together with its position and the text of its line.
///
/// Displays as the line followed by a caret under the column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    pub offset: usize,
    pub position: Position,
    pub line_text: String,
}

impl SourceContext {
    pub fn new(text: &str, offset: usize) -> Self {
        let rope = Rope::from_str(text);
        let position = Position::in_rope(&rope, offset);
        let line_text = rope
            .line(position.line - 1)
            .to_string()
            .trim_end_matches(['\n', '\r'])
            .to_string();
        Self {
            offset,
            position,
            line_text,
        }
    }
}

impl fmt::Display for SourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{}↑",
            self.line_text,
            " ".repeat(self.position.column - 1)
        )
    }
}
