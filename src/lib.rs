mod api;
pub mod args;
mod classify;
pub mod commands;
mod config;
mod db;
mod error;
mod ledger;
mod model;
mod post;
mod retry;
mod routing;
mod session;
mod slots;
mod utils;

#[cfg(test)]
mod test;

pub use api::{CellWrite, GridStore, Mode, TestGrid, TEST_MODE_ENV};
pub use classify::{Classifier, ClassifierSettings};
pub use config::Config;
pub use db::{Bindings, ColumnBinding, NamedCashBucket};
pub use error::{Error, ErrorType, Result, StoreError, StoreErrorKind};
pub use ledger::Ledger;
pub use model::*;
pub use post::{LedgerPoster, PostSettings, PostTarget, ProfitInputs};
pub use retry::{ProgressHook, RetryNotice, RetryPolicy};
pub use routing::{
    crypto_subject, CashBucket, ColumnBindingStore, ColumnRouter, FxRateProvider, Route, Unrouted,
};
pub use session::{
    spawn_sweeper, Edit, EditField, Phase, Session, SessionKey, SessionRegistry, SessionSettings,
    SessionState, SubmitOutcome, WALLET_NUMBERS,
};
pub use slots::{FreeSlotFinder, DEFAULT_BATCH_ROWS};
