//! A1-style addressing for the grid store: column letters, cells, ranges and row bounds.

use anyhow::{bail, ensure, Context};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Converts a column's letters into its 1-based index, e.g. `A` -> 1, `Z` -> 26, `AA` -> 27.
pub fn column_index(letters: &str) -> anyhow::Result<u32> {
    let letters = letters.trim();
    ensure!(!letters.is_empty(), "Column letters cannot be empty");
    let mut index: u32 = 0;
    for c in letters.chars() {
        ensure!(c.is_ascii_alphabetic(), "Invalid column letters '{letters}'");
        let digit = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        index = index
            .checked_mul(26)
            .and_then(|i| i.checked_add(digit))
            .with_context(|| format!("Column '{letters}' is out of range"))?;
    }
    Ok(index)
}

/// Converts a 1-based column index into its letters, e.g. 28 -> `AB`.
pub fn column_letters(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Normalizes column letters to upper case after validating them.
pub fn normalize_column(letters: &str) -> anyhow::Result<String> {
    Ok(column_letters(column_index(letters)?))
}

/// A single cell, e.g. `F12`. Rows are 1-based like the sheet itself.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CellAddress {
    column: String,
    row: u32,
}

impl CellAddress {
    pub fn new(column: impl AsRef<str>, row: u32) -> anyhow::Result<Self> {
        ensure!(row > 0, "Rows are 1-based, got row 0");
        Ok(Self {
            column: normalize_column(column.as_ref())?,
            row,
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    /// The address qualified with a sheet (tab) name, e.g. `Ledger!F12`.
    pub fn on_sheet(&self, sheet: &str) -> String {
        format!("{sheet}!{self}")
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column, self.row)
    }
}

impl FromStr for CellAddress {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Allow a sheet prefix such as "Ledger!F12"
        let s = s.rsplit('!').next().unwrap_or(s).trim();
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .with_context(|| format!("Cell address '{s}' has no row"))?;
        let (column, row) = s.split_at(split);
        let row = row
            .parse::<u32>()
            .with_context(|| format!("Invalid row in cell address '{s}'"))?;
        CellAddress::new(column, row)
    }
}

impl Serialize for CellAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CellAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CellAddress::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// An inclusive span of columns, e.g. `B..=H`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ColumnSpan {
    first: u32,
    last: u32,
}

impl ColumnSpan {
    pub fn new(first: &str, last: &str) -> anyhow::Result<Self> {
        let first_index = column_index(first)?;
        let last_index = column_index(last)?;
        ensure!(
            first_index <= last_index,
            "Column span {first}:{last} is reversed"
        );
        Ok(Self {
            first: first_index,
            last: last_index,
        })
    }

    pub fn first(&self) -> String {
        column_letters(self.first)
    }

    pub fn last(&self) -> String {
        column_letters(self.last)
    }

    pub fn width(&self) -> usize {
        (self.last - self.first + 1) as usize
    }

    pub fn contains(&self, column: &str) -> bool {
        column_index(column)
            .map(|i| i >= self.first && i <= self.last)
            .unwrap_or(false)
    }
}

/// Inclusive bounds of the rows that may be written, e.g. `[5, 20]`. `sentinel()` (one past
/// `max_row`) is the value the slot finder returns when the range is exhausted.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u32; 2]", into = "[u32; 2]")]
pub struct RowBounds {
    start_row: u32,
    max_row: u32,
}

impl RowBounds {
    pub fn new(start_row: u32, max_row: u32) -> anyhow::Result<Self> {
        if start_row == 0 {
            bail!("Rows are 1-based, got start row 0");
        }
        ensure!(
            start_row <= max_row,
            "Row bounds [{start_row}, {max_row}] are reversed"
        );
        Ok(Self { start_row, max_row })
    }

    /// Bounds from constants; panics if they are invalid.
    pub(crate) const fn fixed(start_row: u32, max_row: u32) -> Self {
        assert!(start_row > 0 && start_row <= max_row);
        Self { start_row, max_row }
    }

    pub fn start_row(&self) -> u32 {
        self.start_row
    }

    pub fn max_row(&self) -> u32 {
        self.max_row
    }

    /// The "no space" marker: `max_row + 1`.
    pub fn sentinel(&self) -> u32 {
        self.max_row + 1
    }

    pub fn contains(&self, row: u32) -> bool {
        row >= self.start_row && row <= self.max_row
    }
}

impl TryFrom<[u32; 2]> for RowBounds {
    type Error = anyhow::Error;

    fn try_from(value: [u32; 2]) -> Result<Self, Self::Error> {
        RowBounds::new(value[0], value[1])
    }
}

impl From<RowBounds> for [u32; 2] {
    fn from(value: RowBounds) -> Self {
        [value.start_row, value.max_row]
    }
}

impl fmt::Display for RowBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start_row, self.max_row)
    }
}

/// A rectangular A1 range on a sheet, e.g. `Ledger!B5:H54`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct CellRange {
    sheet: String,
    first_column: u32,
    last_column: u32,
    first_row: u32,
    last_row: u32,
}

impl CellRange {
    pub fn new(sheet: impl Into<String>, span: ColumnSpan, first_row: u32, last_row: u32) -> Self {
        Self {
            sheet: sheet.into(),
            first_column: span.first,
            last_column: span.last,
            first_row,
            last_row: last_row.max(first_row),
        }
    }

    /// A range covering a single column.
    pub fn column(
        sheet: impl Into<String>,
        column: &str,
        first_row: u32,
        last_row: u32,
    ) -> anyhow::Result<Self> {
        let span = ColumnSpan::new(column, column)?;
        Ok(Self::new(sheet, span, first_row, last_row))
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn first_row(&self) -> u32 {
        self.first_row
    }

    pub fn last_row(&self) -> u32 {
        self.last_row
    }

    pub fn first_column(&self) -> u32 {
        self.first_column
    }

    pub fn last_column(&self) -> u32 {
        self.last_column
    }

    pub fn height(&self) -> usize {
        (self.last_row - self.first_row + 1) as usize
    }

    pub fn width(&self) -> usize {
        (self.last_column - self.first_column + 1) as usize
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}!{}{}:{}{}",
            self.sheet,
            column_letters(self.first_column),
            self.first_row,
            column_letters(self.last_column),
            self.last_row
        )
    }
}

impl FromStr for CellRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sheet, cells) = s
            .rsplit_once('!')
            .with_context(|| format!("Range '{s}' has no sheet name"))?;
        let (start, end) = cells.split_once(':').unwrap_or((cells, cells));
        let start = CellAddress::from_str(start)?;
        let end = CellAddress::from_str(end)?;
        let span = ColumnSpan::new(start.column(), end.column())?;
        ensure!(start.row() <= end.row(), "Range '{s}' has reversed rows");
        Ok(CellRange::new(sheet, span, start.row(), end.row()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_index("A").unwrap(), 1);
        assert_eq!(column_index("z").unwrap(), 26);
        assert_eq!(column_index("AA").unwrap(), 27);
        assert_eq!(column_index("AZ").unwrap(), 52);
        assert_eq!(column_letters(1), "A");
        assert_eq!(column_letters(28), "AB");
        assert_eq!(column_letters(702), "ZZ");
        assert!(column_index("A1").is_err());
        assert!(column_index("").is_err());
    }

    #[test]
    fn test_cell_address() {
        let cell: CellAddress = "f12".parse().unwrap();
        assert_eq!(cell.column(), "F");
        assert_eq!(cell.row(), 12);
        assert_eq!(cell.to_string(), "F12");
        assert_eq!(cell.on_sheet("Ledger"), "Ledger!F12");

        let cell: CellAddress = "Ledger!AB7".parse().unwrap();
        assert_eq!(cell, CellAddress::new("AB", 7).unwrap());

        assert!("F".parse::<CellAddress>().is_err());
        assert!("12".parse::<CellAddress>().is_err());
        assert!("F0".parse::<CellAddress>().is_err());
    }

    #[test]
    fn test_cell_address_serde() {
        let cell = CellAddress::new("c", 40).unwrap();
        let json = serde_json::to_string(&cell).unwrap();
        assert_eq!(json, r#""C40""#);
        let back: CellAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cell);
    }

    #[test]
    fn test_range_display_and_parse() {
        let span = ColumnSpan::new("B", "H").unwrap();
        let range = CellRange::new("Ledger", span, 5, 54);
        assert_eq!(range.to_string(), "Ledger!B5:H54");
        assert_eq!(range.width(), 7);
        assert_eq!(range.height(), 50);

        let parsed: CellRange = "Ledger!B5:H54".parse().unwrap();
        assert_eq!(parsed, range);

        let single: CellRange = "Rates!C3".parse().unwrap();
        assert_eq!(single.height(), 1);
        assert_eq!(single.width(), 1);
    }

    #[test]
    fn test_row_bounds() {
        let bounds = RowBounds::new(5, 20).unwrap();
        assert_eq!(bounds.sentinel(), 21);
        assert!(bounds.contains(5));
        assert!(bounds.contains(20));
        assert!(!bounds.contains(21));
        assert!(RowBounds::new(0, 3).is_err());
        assert!(RowBounds::new(9, 3).is_err());

        let parsed: RowBounds = serde_json::from_str("[5, 20]").unwrap();
        assert_eq!(parsed, bounds);
        assert!(serde_json::from_str::<RowBounds>("[20, 5]").is_err());
    }

    #[test]
    fn test_column_span() {
        let span = ColumnSpan::new("b", "d").unwrap();
        assert_eq!(span.first(), "B");
        assert_eq!(span.last(), "D");
        assert!(span.contains("C"));
        assert!(!span.contains("E"));
        assert!(ColumnSpan::new("D", "B").is_err());
    }
}
