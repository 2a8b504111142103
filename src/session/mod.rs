//! Collects the fragments of one logical transaction into ledger rows.
//!
//! A `Session` is the per-(user, session key) buffer. It lives in a `SessionRegistry`, which
//! serializes all work on one session behind that session's own lock.

mod registry;

pub use registry::{spawn_sweeper, SessionRegistry};

use crate::classify::Classifier;
use crate::error::{Error, ErrorType, Result};
use crate::model::{
    ClassifiedEntry, EntryKind, LedgerRow, PostBatch, PostMode, PostStatus, RawFragment, Slot,
    WalletSelections, MAX_ROWS,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The wallet numbers an operator can choose from.
pub const WALLET_NUMBERS: RangeInclusive<u8> = 1..=3;

/// Tunable parts of session handling.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Row limit per session. Values above `MAX_ROWS` are capped.
    pub max_rows: usize,
    /// Sessions untouched for this long are evicted by the sweeper.
    pub idle_timeout_secs: u64,
    /// Crypto currencies that need a wallet number before the session can be confirmed.
    pub wallet_currencies: Vec<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_rows: MAX_ROWS,
            idle_timeout_secs: 30 * 60,
            wallet_currencies: vec!["XMR".to_string()],
        }
    }
}

impl SessionSettings {
    pub fn max_rows(&self) -> usize {
        self.max_rows.clamp(1, MAX_ROWS)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn needs_wallet(&self, currency: &str) -> bool {
        self.wallet_currencies
            .iter()
            .any(|c| c.eq_ignore_ascii_case(currency))
    }
}

/// Identifies a session: the user plus the user's session key.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: i64,
    pub session_key: String,
}

impl SessionKey {
    pub fn new(user_id: i64, session_key: impl Into<String>) -> Self {
        Self {
            user_id,
            session_key: session_key.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.session_key)
    }
}

/// The field an operator is editing.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditField {
    Amount,
    Currency,
    /// The wallet number that a just-chosen currency requires.
    WalletNumber,
    Card,
}

/// Where the session is in its lifecycle. `Idle` is the absence of a session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Collecting,
    Editing { row: usize, field: EditField },
    Confirmed,
    Posting,
    Posted,
    PartiallyPosted,
    Failed,
}

impl Phase {
    /// Fragments and edits are only accepted while collecting or editing.
    pub fn is_open(&self) -> bool {
        matches!(self, Phase::Collecting | Phase::Editing { .. })
    }
}

impl From<PostStatus> for Phase {
    fn from(status: PostStatus) -> Self {
        match status {
            PostStatus::Posted => Phase::Posted,
            PostStatus::PartiallyPosted => Phase::PartiallyPosted,
            PostStatus::Failed => Phase::Failed,
        }
    }
}

/// An operator correction to one row.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "edit", rename_all = "snake_case")]
pub enum Edit {
    /// Replace the amount of the crypto or cash entry.
    Amount { slot: Slot, amount: Decimal },
    /// Reassign the crypto currency or the cash bucket. `wallet` is required when the new crypto
    /// currency needs a wallet number; without it the session waits for `WalletNumber`.
    Currency {
        slot: Slot,
        currency: String,
        #[serde(default)]
        wallet: Option<u8>,
    },
    WalletNumber { wallet: u8 },
    /// Substitute the card, e.g. one picked from a list. The user name already on the row's card
    /// is kept.
    Card {
        card_name: String,
        #[serde(default)]
        card_number: Option<String>,
    },
}

/// What happened to a submitted fragment.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The entry went into `slot` of row `row`.
    Absorbed { row: usize, slot: Slot },
    /// The fragment's origin id was seen before.
    DuplicateFragment,
    /// The current row already holds an entry of this kind; the first one wins.
    DuplicateKind { row: usize, slot: Slot },
    /// A user name was added to the card in row `row`.
    UserNameSpliced { row: usize },
    /// A user name arrived before any card; it will go to the next card without one.
    UserNamePending,
    /// Nothing could be made of the fragment.
    Unclassified,
}

impl SubmitOutcome {
    /// The error category of a fragment that was not absorbed, if it was not.
    pub fn error_type(&self) -> Option<ErrorType> {
        match self {
            SubmitOutcome::DuplicateFragment => Some(ErrorType::DuplicateFragment),
            SubmitOutcome::Unclassified => Some(ErrorType::ClassificationAmbiguous),
            _ => None,
        }
    }
}

/// The view of a session returned after each submission.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub key: SessionKey,
    pub outcome: SubmitOutcome,
    /// The classified fragment, when it was classified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<ClassifiedEntry>,
    pub rows: Vec<LedgerRow>,
    pub phase: Phase,
    /// Set once a row holds two or more entries.
    pub ready_for_review: bool,
}

/// The fragment buffer of one session.
#[derive(Debug, Clone)]
pub struct Session {
    key: SessionKey,
    settings: SessionSettings,
    rows: Vec<LedgerRow>,
    wallets: WalletSelections,
    mode: PostMode,
    phase: Phase,
    seen: HashSet<String>,
    pending_user_name: Option<String>,
    ready_for_review: bool,
    last_activity: Instant,
    /// Set when the registry dropped the session while someone still held a handle to it.
    discarded: bool,
}

impl Session {
    /// A new session with one empty row.
    pub fn new(key: SessionKey, mode: PostMode, settings: SessionSettings) -> Self {
        Self {
            key,
            settings,
            rows: vec![LedgerRow::new(0)],
            wallets: WalletSelections::new(),
            mode,
            phase: Phase::Collecting,
            seen: HashSet::new(),
            pending_user_name: None,
            ready_for_review: false,
            last_activity: Instant::now(),
            discarded: false,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn wallets(&self) -> &WalletSelections {
        &self.wallets
    }

    pub fn mode(&self) -> PostMode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True from confirmation until the session is discarded.
    pub fn is_locked(&self) -> bool {
        !self.phase.is_open()
    }

    pub fn pending_user_name(&self) -> Option<&str> {
        self.pending_user_name.as_deref()
    }

    pub fn ready_for_review(&self) -> bool {
        self.ready_for_review
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn set_mode(&mut self, mode: PostMode) -> Result<()> {
        self.ensure_open("change the mode")?;
        self.mode = mode;
        self.touch();
        Ok(())
    }

    /// The row new fragments go to: the last row with a free slot, or the last row.
    pub fn current_row(&self) -> usize {
        self.rows
            .iter()
            .rposition(LedgerRow::has_free_slot)
            .unwrap_or(self.rows.len() - 1)
    }

    /// Classifies `fragment` and files it into the current row.
    pub(crate) fn absorb(
        &mut self,
        fragment: &RawFragment,
        classifier: &Classifier,
    ) -> Result<SessionState> {
        self.ensure_open("accept fragments")?;
        self.touch();

        if !self.seen.insert(fragment.origin_id.clone()) {
            warn!(
                "Dropping fragment {} in session {}: already absorbed",
                fragment.origin_id, self.key
            );
            return Ok(self.state(SubmitOutcome::DuplicateFragment, None));
        }

        let mut entry = classifier.classify(&fragment.text);
        if entry.kind == EntryKind::Unknown {
            if let Some(found) = classifier.reclassify(&fragment.text) {
                debug!("Reclassified '{}' as {}", entry.display, found.kind);
                entry = found;
            }
        }
        debug!(
            "Fragment {} at {} in session {} classified as {}: {}",
            fragment.origin_id, fragment.timestamp, self.key, entry.kind, entry.display
        );

        let outcome = match entry.kind {
            EntryKind::Unknown => {
                warn!("Could not classify '{}'", entry.display);
                SubmitOutcome::Unclassified
            }
            EntryKind::UserName => self.splice_user_name(&entry),
            _ => {
                if entry.kind == EntryKind::CardRef && entry.user_name.is_none() {
                    if let Some(name) = self.pending_user_name.take() {
                        entry.user_name = Some(name);
                        entry.refresh_display();
                    }
                }
                let index = self.current_row();
                let row = &mut self.rows[index];
                match row.try_insert(entry.clone()) {
                    Ok(slot) => {
                        if row.len() >= 2 {
                            self.ready_for_review = true;
                        }
                        info!("Session {}: {} into row {index}", self.key, entry.display);
                        SubmitOutcome::Absorbed { row: index, slot }
                    }
                    Err(dropped) => {
                        // Slot::for_kind is Some for every kind reaching this arm
                        let slot = Slot::for_kind(dropped.kind).unwrap_or(Slot::Card);
                        warn!(
                            "Session {}: row {index} already has a {slot} entry, dropping '{}'",
                            self.key, dropped.display
                        );
                        SubmitOutcome::DuplicateKind { row: index, slot }
                    }
                }
            }
        };
        Ok(self.state(outcome, Some(entry)))
    }

    fn splice_user_name(&mut self, entry: &ClassifiedEntry) -> SubmitOutcome {
        let name = entry.user_name.clone().unwrap_or_default();
        let target = self
            .rows
            .iter_mut()
            .find(|r| r.card.as_ref().is_some_and(|c| c.user_name.is_none()));
        match target {
            Some(row) => {
                if let Some(card) = row.card.as_mut() {
                    card.user_name = Some(name);
                    card.refresh_display();
                }
                SubmitOutcome::UserNameSpliced { row: row.index }
            }
            None => {
                self.pending_user_name = Some(name);
                SubmitOutcome::UserNamePending
            }
        }
    }

    /// Appends an empty row. Rejected once the session holds its maximum number of rows.
    pub fn add_row(&mut self) -> Result<usize> {
        self.ensure_open("add rows")?;
        let max = self.settings.max_rows();
        if self.rows.len() >= max {
            return Err(Error::msg(
                ErrorType::CapacityExceeded,
                format!("A session holds at most {max} rows"),
            ));
        }
        let index = self.rows.len();
        self.rows.push(LedgerRow::new(index));
        self.touch();
        Ok(index)
    }

    /// Removes row `index`. The last remaining row cannot be removed.
    pub fn remove_row(&mut self, index: usize) -> Result<()> {
        self.ensure_open("remove rows")?;
        self.check_row(index)?;
        if self.rows.len() == 1 {
            return Err(Error::msg(
                ErrorType::Validation,
                "The only row of a session cannot be removed",
            ));
        }
        self.rows.remove(index);
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.index = i;
        }
        self.wallets = std::mem::take(&mut self.wallets)
            .into_iter()
            .filter(|(row, _)| *row != index)
            .map(|(row, n)| if row > index { (row - 1, n) } else { (row, n) })
            .collect();
        if let Phase::Editing { row, .. } = self.phase {
            if row >= index {
                self.phase = Phase::Collecting;
            }
        }
        self.touch();
        Ok(())
    }

    /// Enters the editing sub-state for one field of one row.
    pub fn begin_edit(&mut self, row: usize, field: EditField) -> Result<()> {
        self.ensure_open("edit")?;
        self.check_row(row)?;
        self.phase = Phase::Editing { row, field };
        self.touch();
        Ok(())
    }

    /// Leaves the editing sub-state without changing anything.
    pub fn cancel_edit(&mut self) {
        if let Phase::Editing { .. } = self.phase {
            self.phase = Phase::Collecting;
        }
    }

    /// Applies `edit` to row `row`. On success the session returns to collecting, unless a
    /// currency change now waits for a wallet number.
    pub fn edit(&mut self, row: usize, edit: Edit) -> Result<()> {
        self.ensure_open("edit")?;
        self.check_row(row)?;
        self.touch();
        match edit {
            Edit::Amount { slot, amount } => {
                if amount <= Decimal::ZERO {
                    return Err(Error::msg(
                        ErrorType::Validation,
                        "Amounts must be greater than zero",
                    ));
                }
                let entry = self.entry_mut(row, slot)?;
                entry.amount = Some(amount);
                entry.refresh_display();
                self.phase = Phase::Collecting;
            }
            Edit::Currency {
                slot,
                currency,
                wallet,
            } => {
                let currency = currency.trim().to_uppercase();
                if currency.is_empty() {
                    return Err(Error::msg(ErrorType::Validation, "The currency is empty"));
                }
                if slot == Slot::Card {
                    return Err(Error::msg(ErrorType::Validation, "A card has no currency"));
                }
                let needs_wallet = slot == Slot::Crypto && self.settings.needs_wallet(&currency);
                if let Some(n) = wallet.filter(|_| needs_wallet) {
                    check_wallet(n)?;
                }
                let entry = self.entry_mut(row, slot)?;
                entry.currency = Some(currency);
                entry.refresh_display();

                self.phase = Phase::Collecting;
                if slot == Slot::Crypto {
                    match (needs_wallet, wallet) {
                        (true, Some(n)) => {
                            self.wallets.insert(row, n);
                        }
                        (true, None) => {
                            self.wallets.remove(&row);
                            self.phase = Phase::Editing {
                                row,
                                field: EditField::WalletNumber,
                            };
                        }
                        (false, _) => {
                            self.wallets.remove(&row);
                        }
                    }
                }
            }
            Edit::WalletNumber { wallet } => {
                check_wallet(wallet)?;
                let currency = self.rows[row]
                    .crypto
                    .as_ref()
                    .and_then(|c| c.currency.clone())
                    .unwrap_or_default();
                if !self.settings.needs_wallet(&currency) {
                    return Err(Error::msg(
                        ErrorType::Validation,
                        format!("Row {} has no crypto entry that needs a wallet", row + 1),
                    ));
                }
                self.wallets.insert(row, wallet);
                self.phase = Phase::Collecting;
            }
            Edit::Card {
                card_name,
                card_number,
            } => {
                let card_name = card_name.trim().to_uppercase();
                if card_name.is_empty() {
                    return Err(Error::msg(ErrorType::Validation, "The card name is empty"));
                }
                let user_name = self.rows[row]
                    .card
                    .as_ref()
                    .and_then(|c| c.user_name.clone())
                    .or_else(|| self.pending_user_name.take());
                let card = ClassifiedEntry::card(card_name, card_number, user_name);
                self.rows[row].replace(Slot::Card, card);
                self.phase = Phase::Collecting;
            }
        }
        Ok(())
    }

    /// Validates the session and locks it. Empty rows are dropped; every amount must be positive
    /// and every crypto currency that needs a wallet number must have one.
    pub fn confirm(&mut self) -> Result<PostBatch> {
        self.ensure_open("confirm")?;
        let rows: Vec<LedgerRow> = self.rows.iter().filter(|r| r.is_valid()).cloned().collect();
        if rows.is_empty() {
            return Err(Error::msg(ErrorType::Validation, "There is nothing to post"));
        }

        for row in &rows {
            if let Some(slot) = row.non_positive_amounts().first() {
                return Err(Error::msg(
                    ErrorType::Validation,
                    format!("Row {}: the {slot} amount must be greater than zero", row.index + 1),
                ));
            }
            let currency = row.crypto.as_ref().and_then(|c| c.currency.as_deref());
            if let Some(currency) = currency.filter(|c| self.settings.needs_wallet(c)) {
                match self.wallets.get(&row.index) {
                    Some(n) if WALLET_NUMBERS.contains(n) => {}
                    _ => {
                        return Err(Error::msg(
                            ErrorType::Validation,
                            format!(
                                "Row {}: choose a wallet number for {currency}",
                                row.index + 1
                            ),
                        ))
                    }
                }
            }
        }

        let wallets = self
            .wallets
            .iter()
            .filter(|(i, _)| rows.iter().any(|r| r.index == **i))
            .map(|(i, n)| (*i, *n))
            .collect();
        self.phase = Phase::Confirmed;
        self.touch();
        info!("Session {} confirmed with {} row(s)", self.key, rows.len());
        Ok(PostBatch {
            rows,
            wallets,
            mode: self.mode,
        })
    }

    pub(crate) fn begin_posting(&mut self) -> Result<()> {
        if self.phase != Phase::Confirmed {
            return Err(self.phase_error("start posting"));
        }
        self.phase = Phase::Posting;
        self.touch();
        Ok(())
    }

    pub(crate) fn finish_posting(&mut self, status: PostStatus) {
        self.phase = status.into();
        self.touch();
    }

    pub(crate) fn is_discarded(&self) -> bool {
        self.discarded
    }

    pub(crate) fn discard(&mut self) {
        self.discarded = true;
    }

    pub(crate) fn state(&self, outcome: SubmitOutcome, entry: Option<ClassifiedEntry>) -> SessionState {
        SessionState {
            key: self.key.clone(),
            outcome,
            entry,
            rows: self.rows.clone(),
            phase: self.phase,
            ready_for_review: self.ready_for_review,
        }
    }

    fn entry_mut(&mut self, row: usize, slot: Slot) -> Result<&mut ClassifiedEntry> {
        self.rows[row].get_mut(slot).ok_or_else(|| {
            Error::msg(
                ErrorType::Validation,
                format!("Row {} has no {slot} entry", row + 1),
            )
        })
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row >= self.rows.len() {
            return Err(Error::msg(
                ErrorType::Validation,
                format!("Row {} does not exist", row + 1),
            ));
        }
        Ok(())
    }

    fn ensure_open(&self, action: &str) -> Result<()> {
        if self.phase.is_open() {
            Ok(())
        } else {
            Err(self.phase_error(action))
        }
    }

    fn phase_error(&self, action: &str) -> Error {
        Error::msg(
            ErrorType::SessionState,
            format!("Session {} cannot {action} while {:?}", self.key, self.phase),
        )
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

fn check_wallet(n: u8) -> Result<()> {
    if WALLET_NUMBERS.contains(&n) {
        Ok(())
    } else {
        Err(Error::msg(
            ErrorType::Validation,
            format!(
                "Wallet number {n} is out of range {}..={}",
                WALLET_NUMBERS.start(),
                WALLET_NUMBERS.end()
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            SessionKey::new(7, "s1"),
            PostMode::Add,
            SessionSettings::default(),
        )
    }

    fn fragment(text: &str, id: &str) -> RawFragment {
        RawFragment::new(text, id, 1_700_000_000, "s1")
    }

    fn submit(s: &mut Session, text: &str, id: &str) -> SessionState {
        s.absorb(&fragment(text, id), &Classifier::default()).unwrap()
    }

    #[test]
    fn test_second_entry_of_same_kind_is_dropped() {
        let mut s = session();
        let first = submit(&mut s, "0.008", "m1");
        assert_eq!(
            first.outcome,
            SubmitOutcome::Absorbed {
                row: 0,
                slot: Slot::Crypto
            }
        );
        let second = submit(&mut s, "0.02", "m2");
        assert_eq!(
            second.outcome,
            SubmitOutcome::DuplicateKind {
                row: 0,
                slot: Slot::Crypto
            }
        );
        assert_eq!(
            s.rows()[0].crypto.as_ref().unwrap().amount,
            Some(Decimal::new(8, 3))
        );
    }

    #[test]
    fn test_duplicate_origin_is_dropped() {
        let mut s = session();
        submit(&mut s, "5000", "m1");
        let again = submit(&mut s, "0.008", "m1");
        assert_eq!(again.outcome, SubmitOutcome::DuplicateFragment);
        assert_eq!(again.outcome.error_type(), Some(ErrorType::DuplicateFragment));
        assert!(s.rows()[0].crypto.is_none());
    }

    #[test]
    fn test_ready_for_review_after_second_entry() {
        let mut s = session();
        assert!(!submit(&mut s, "0.008", "m1").ready_for_review);
        assert!(submit(&mut s, "5000", "m2").ready_for_review);
    }

    #[test]
    fn test_unknown_is_reclassified() {
        let mut s = session();
        let state = submit(&mut s, "sent 0,8 just now", "m1");
        assert_eq!(
            state.outcome,
            SubmitOutcome::Absorbed {
                row: 0,
                slot: Slot::Crypto
            }
        );
        let state = submit(&mut s, "hello there", "m2");
        assert_eq!(state.outcome, SubmitOutcome::Unclassified);
        assert_eq!(
            state.outcome.error_type(),
            Some(ErrorType::ClassificationAmbiguous)
        );
    }

    #[test]
    fn test_user_name_spliced_into_card() {
        let mut s = session();
        submit(&mut s, "SBER", "m1");
        let state = submit(&mut s, "(Jane K.)", "m2");
        assert_eq!(state.outcome, SubmitOutcome::UserNameSpliced { row: 0 });
        let card = s.rows()[0].card.as_ref().unwrap();
        assert_eq!(card.user_name.as_deref(), Some("Jane K."));
        assert_eq!(card.display, "SBER (Jane K.)");
    }

    #[test]
    fn test_user_name_spliced_into_card_of_later_row() {
        let mut s = session();
        submit(&mut s, "2202 2062 1234 5678 (Jane K.)", "m1");
        s.add_row().unwrap();
        let state = submit(&mut s, "TINK", "m2");
        assert_eq!(
            state.outcome,
            SubmitOutcome::Absorbed {
                row: 1,
                slot: Slot::Card
            }
        );
        assert_eq!(state.outcome.error_type(), None);

        let state = submit(&mut s, "(Petro S.)", "m3");
        assert_eq!(state.outcome, SubmitOutcome::UserNameSpliced { row: 1 });
        assert_eq!(
            s.rows()[0].card.as_ref().unwrap().user_name.as_deref(),
            Some("Jane K.")
        );
        let card = s.rows()[1].card.as_ref().unwrap();
        assert_eq!(card.user_name.as_deref(), Some("Petro S."));
        assert_eq!(card.display, "TINK (Petro S.)");
        assert_eq!(s.pending_user_name(), None);
    }

    #[test]
    fn test_pending_user_name() {
        let mut s = session();
        let state = submit(&mut s, "(Jane K.)", "m1");
        assert_eq!(state.outcome, SubmitOutcome::UserNamePending);
        assert_eq!(s.pending_user_name(), Some("Jane K."));
        submit(&mut s, "TINK", "m2");
        assert_eq!(s.pending_user_name(), None);
        assert_eq!(
            s.rows()[0].card.as_ref().unwrap().user_name.as_deref(),
            Some("Jane K.")
        );
    }

    #[test]
    fn test_row_cap() {
        let mut s = session();
        let mut errors = 0;
        for _ in 0..10 {
            match s.add_row() {
                Ok(_) => {}
                Err(e) => {
                    assert_eq!(e.error_type(), ErrorType::CapacityExceeded);
                    errors += 1;
                }
            }
        }
        assert_eq!(s.rows().len(), 5);
        assert_eq!(errors, 6);
    }

    #[test]
    fn test_current_row_follows_free_slots() {
        let mut s = session();
        submit(&mut s, "0.008", "m1");
        submit(&mut s, "5000", "m2");
        submit(&mut s, "SBER", "m3");
        assert_eq!(s.current_row(), 0);
        s.add_row().unwrap();
        assert_eq!(s.current_row(), 1);
        let state = submit(&mut s, "0.5", "m4");
        assert_eq!(
            state.outcome,
            SubmitOutcome::Absorbed {
                row: 1,
                slot: Slot::Crypto
            }
        );
    }

    #[test]
    fn test_remove_row_reindexes() {
        let mut s = session();
        s.add_row().unwrap();
        s.add_row().unwrap();
        s.wallets.insert(1, 1);
        s.wallets.insert(2, 3);
        s.remove_row(1).unwrap();
        assert_eq!(s.rows().len(), 2);
        assert_eq!(s.rows()[1].index, 1);
        assert_eq!(s.wallets().get(&1), Some(&3));

        s.remove_row(0).unwrap();
        let e = s.remove_row(0).unwrap_err();
        assert_eq!(e.error_type(), ErrorType::Validation);
    }

    #[test]
    fn test_edit_amount() {
        let mut s = session();
        submit(&mut s, "5000", "m1");
        s.begin_edit(0, EditField::Amount).unwrap();
        assert_eq!(
            s.phase(),
            Phase::Editing {
                row: 0,
                field: EditField::Amount
            }
        );
        s.edit(
            0,
            Edit::Amount {
                slot: Slot::Cash,
                amount: Decimal::from(5500),
            },
        )
        .unwrap();
        assert_eq!(s.phase(), Phase::Collecting);
        assert_eq!(s.rows()[0].cash.as_ref().unwrap().display, "5500 RUB");

        let e = s
            .edit(
                0,
                Edit::Amount {
                    slot: Slot::Cash,
                    amount: Decimal::ZERO,
                },
            )
            .unwrap_err();
        assert_eq!(e.error_type(), ErrorType::Validation);
    }

    #[test]
    fn test_currency_needing_wallet() {
        let mut s = session();
        submit(&mut s, "0.5", "m1");
        s.edit(
            0,
            Edit::Currency {
                slot: Slot::Crypto,
                currency: "xmr".to_string(),
                wallet: None,
            },
        )
        .unwrap();
        assert_eq!(
            s.phase(),
            Phase::Editing {
                row: 0,
                field: EditField::WalletNumber
            }
        );

        let e = s.confirm().unwrap_err();
        assert_eq!(e.error_type(), ErrorType::Validation);
        assert!(e.to_string().contains("Row 1"));

        assert!(s.edit(0, Edit::WalletNumber { wallet: 4 }).is_err());
        s.edit(0, Edit::WalletNumber { wallet: 2 }).unwrap();
        let batch = s.confirm().unwrap();
        assert_eq!(batch.wallet(0), Some(2));
        assert!(s.is_locked());
    }

    #[test]
    fn test_card_substitution_keeps_user_name() {
        let mut s = session();
        submit(&mut s, "SBER", "m1");
        submit(&mut s, "(Jane K.)", "m2");
        s.edit(
            0,
            Edit::Card {
                card_name: "tink".to_string(),
                card_number: None,
            },
        )
        .unwrap();
        let card = s.rows()[0].card.as_ref().unwrap();
        assert_eq!(card.card_name.as_deref(), Some("TINK"));
        assert_eq!(card.user_name.as_deref(), Some("Jane K."));
    }

    #[test]
    fn test_confirm_filters_empty_rows_and_locks() {
        let mut s = session();
        submit(&mut s, "0.008", "m1");
        s.add_row().unwrap();
        let batch = s.confirm().unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.mode, PostMode::Add);
        assert_eq!(s.phase(), Phase::Confirmed);

        let e = s
            .absorb(&fragment("5000", "m9"), &Classifier::default())
            .unwrap_err();
        assert_eq!(e.error_type(), ErrorType::SessionState);
        assert!(s.add_row().is_err());
    }

    #[test]
    fn test_confirm_empty_session() {
        let mut s = session();
        let e = s.confirm().unwrap_err();
        assert_eq!(e.error_type(), ErrorType::Validation);
        assert_eq!(s.phase(), Phase::Collecting);
    }

    #[test]
    fn test_posting_lifecycle() {
        let mut s = session();
        assert!(s.begin_posting().is_err());
        submit(&mut s, "0.008", "m1");
        s.confirm().unwrap();
        s.begin_posting().unwrap();
        assert_eq!(s.phase(), Phase::Posting);
        s.finish_posting(PostStatus::PartiallyPosted);
        assert_eq!(s.phase(), Phase::PartiallyPosted);
    }
}
