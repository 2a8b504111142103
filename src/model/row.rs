use crate::model::{ClassifiedEntry, EntryKind, PostMode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The maximum number of rows a session may hold.
pub const MAX_ROWS: usize = 5;

/// The three slots of a ledger row.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Crypto,
    Cash,
    Card,
}

serde_plain::derive_display_from_serialize!(Slot);
serde_plain::derive_fromstr_from_deserialize!(Slot);

impl Slot {
    /// The slot an entry of `kind` occupies, if any. User names and unknown fragments never
    /// occupy a slot.
    pub fn for_kind(kind: EntryKind) -> Option<Slot> {
        match kind {
            EntryKind::Crypto => Some(Slot::Crypto),
            EntryKind::Cash => Some(Slot::Cash),
            EntryKind::CardRef => Some(Slot::Card),
            EntryKind::UserName | EntryKind::Unknown => None,
        }
    }
}

/// Up to three entries (crypto, cash, card) that become one unit of posting. Each kind has its
/// own field, so a row can never hold two entries of the same kind.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto: Option<ClassifiedEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash: Option<ClassifiedEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<ClassifiedEntry>,
}

impl LedgerRow {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn get(&self, slot: Slot) -> Option<&ClassifiedEntry> {
        match slot {
            Slot::Crypto => self.crypto.as_ref(),
            Slot::Cash => self.cash.as_ref(),
            Slot::Card => self.card.as_ref(),
        }
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut ClassifiedEntry> {
        match slot {
            Slot::Crypto => self.crypto.as_mut(),
            Slot::Cash => self.cash.as_mut(),
            Slot::Card => self.card.as_mut(),
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut Option<ClassifiedEntry> {
        match slot {
            Slot::Crypto => &mut self.crypto,
            Slot::Cash => &mut self.cash,
            Slot::Card => &mut self.card,
        }
    }

    /// Places `entry` into its slot. First writer wins: if the slot is taken, or the entry does
    /// not belong in a slot, the entry is handed back.
    pub fn try_insert(&mut self, entry: ClassifiedEntry) -> Result<Slot, ClassifiedEntry> {
        let Some(slot) = Slot::for_kind(entry.kind) else {
            return Err(entry);
        };
        let target = self.slot_mut(slot);
        if target.is_some() {
            return Err(entry);
        }
        *target = Some(entry);
        Ok(slot)
    }

    /// Replaces whatever is in `slot`. Used by operator edits only.
    pub fn replace(&mut self, slot: Slot, entry: ClassifiedEntry) -> Option<ClassifiedEntry> {
        self.slot_mut(slot).replace(entry)
    }

    pub fn clear(&mut self, slot: Slot) -> Option<ClassifiedEntry> {
        self.slot_mut(slot).take()
    }

    pub fn is_occupied(&self, slot: Slot) -> bool {
        self.get(slot).is_some()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        [&self.crypto, &self.cash, &self.card]
            .iter()
            .filter(|s| s.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A row is valid when at least one slot holds an entry.
    pub fn is_valid(&self) -> bool {
        !self.is_empty()
    }

    pub fn has_free_slot(&self) -> bool {
        self.len() < 3
    }

    /// All entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = (Slot, &ClassifiedEntry)> {
        [
            (Slot::Crypto, self.crypto.as_ref()),
            (Slot::Cash, self.cash.as_ref()),
            (Slot::Card, self.card.as_ref()),
        ]
        .into_iter()
        .filter_map(|(slot, entry)| entry.map(|e| (slot, e)))
    }

    /// Entries carrying an amount that is zero or negative.
    pub fn non_positive_amounts(&self) -> Vec<Slot> {
        self.entries()
            .filter(|(_, e)| matches!(e.amount, Some(a) if a <= Decimal::ZERO))
            .map(|(slot, _)| slot)
            .collect()
    }
}

/// Wallet numbers (1..=3) chosen for rows whose crypto currency needs one, keyed by row index.
pub type WalletSelections = BTreeMap<usize, u8>;

/// What a confirmed session hands to the poster: the non-empty rows, the wallet numbers chosen
/// for them and the posting mode.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PostBatch {
    pub rows: Vec<LedgerRow>,
    #[serde(default)]
    pub wallets: WalletSelections,
    #[serde(default)]
    pub mode: PostMode,
}

impl PostBatch {
    pub fn new(rows: Vec<LedgerRow>, mode: PostMode) -> Self {
        Self {
            rows,
            wallets: WalletSelections::new(),
            mode,
        }
    }

    /// The wallet number selected for row `index`.
    pub fn wallet(&self, index: usize) -> Option<u8> {
        self.wallets.get(&index).copied()
    }
}
