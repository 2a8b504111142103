//! Types that represent the core data model: fragments, classified entries, ledger rows, grid
//! addresses and post results.
mod amount;
mod cell;
mod entry;
mod report;
mod row;

pub use amount::{format_amount, parse_amount, round_to_integer, AmountError};
pub use cell::{column_index, column_letters, normalize_column, CellAddress, CellRange};
pub use cell::{ColumnSpan, RowBounds};
pub use entry::{ClassifiedEntry, EntryKind, RawFragment};
pub use report::{FailedEntry, FailureReason, PostMode, PostResult, PostStatus, WrittenEntry};
pub use row::{LedgerRow, PostBatch, Slot, WalletSelections, MAX_ROWS};
