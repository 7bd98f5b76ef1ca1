//! Intermediate structures used while reconstructing the report table.

use std::collections::BTreeMap;

/// Vertical distance between the origins of consecutive pages.
///
/// Larger than any page height, so page `n + 1` always sorts below page `n`.
pub const PAGE_OFFSET: f32 = 1000.0;

/// A run of text extracted from the document with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedFragment {
    pub text: String,

    /// Horizontal position of the text origin
    pub x: f32,

    /// Top-down vertical position, already offset by page
    pub y: f32,

    /// Zero-based page index
    pub page: usize,
}

impl PositionedFragment {
    pub fn new(text: impl Into<String>, x: f32, y: f32, page: usize) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            page,
        }
    }

    /// Integer line coordinate used to group fragments into rows.
    pub fn line(&self) -> i64 {
        self.y.round() as i64
    }
}

/// Logical column of the report table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Date,
    Time,
    Matchup,
    Team,
    Player,
    Status,
    Reason,
}

/// One reconstructed line of the table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogicalRow {
    pub line: i64,
    pub cells: BTreeMap<Column, String>,
}

impl LogicalRow {
    pub fn new(line: i64) -> Self {
        Self {
            line,
            cells: BTreeMap::new(),
        }
    }

    /// Append text to a cell, space-joining with what is already there.
    pub fn push(&mut self, column: Column, text: &str) {
        let cell = self.cells.entry(column).or_default();
        if !cell.is_empty() {
            cell.push(' ');
        }
        cell.push_str(text);
    }

    /// Cell text, or `None` when the cell is missing or blank.
    pub fn cell(&self, column: Column) -> Option<&str> {
        self.cells
            .get(&column)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_joins_with_space() {
        let mut row = LogicalRow::new(120);
        row.push(Column::Reason, "Injury/Illness-Left");
        row.push(Column::Reason, "Ankle;Sprain");
        assert_eq!(
            row.cell(Column::Reason),
            Some("Injury/Illness-Left Ankle;Sprain")
        );
        assert_eq!(row.cell(Column::Player), None);
    }

    #[test]
    fn test_line_rounds_to_nearest() {
        assert_eq!(PositionedFragment::new("x", 0.0, 99.6, 0).line(), 100);
        assert_eq!(PositionedFragment::new("x", 0.0, 99.4, 0).line(), 99);
    }
}
