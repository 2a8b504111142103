//! Fragments as they arrive and the typed entries the classifier turns them into.

use crate::model::amount::format_amount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One unit of free-form input: a forwarded or typed chat message.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RawFragment {
    /// The message text.
    pub text: String,
    /// The identity of the message that carried the text; used to de-duplicate forwards.
    pub origin_id: String,
    /// Unix timestamp (seconds) of the message.
    pub timestamp: i64,
    /// The session this fragment belongs to, scoped by user.
    pub session_key: String,
}

impl RawFragment {
    pub fn new(
        text: impl Into<String>,
        origin_id: impl Into<String>,
        timestamp: i64,
        session_key: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            origin_id: origin_id.into(),
            timestamp,
            session_key: session_key.into(),
        }
    }
}

/// The type of a classified fragment.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Crypto,
    Cash,
    CardRef,
    UserName,
    Unknown,
}

serde_plain::derive_display_from_serialize!(EntryKind);
serde_plain::derive_fromstr_from_deserialize!(EntryKind);

/// A fragment after classification.
///
/// `currency` holds a crypto class (e.g. `BTC`) for `Crypto` entries and a cash bucket name (e.g.
/// `RUB`) for `Cash` entries. `display` is what an operator sees when reviewing the session.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEntry {
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// The cash amount carried a "no debt" qualifier.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_debt: bool,
    pub display: String,
}

impl ClassifiedEntry {
    pub fn crypto(amount: Decimal, currency: impl Into<String>) -> Self {
        let mut entry = Self::empty(EntryKind::Crypto);
        entry.amount = Some(amount);
        entry.currency = Some(currency.into());
        entry.refresh_display();
        entry
    }

    pub fn cash(amount: Decimal, bucket: impl Into<String>, no_debt: bool) -> Self {
        let mut entry = Self::empty(EntryKind::Cash);
        entry.amount = Some(amount);
        entry.currency = Some(bucket.into());
        entry.no_debt = no_debt;
        entry.refresh_display();
        entry
    }

    pub fn card(
        card_name: impl Into<String>,
        card_number: Option<String>,
        user_name: Option<String>,
    ) -> Self {
        let mut entry = Self::empty(EntryKind::CardRef);
        entry.card_name = Some(card_name.into());
        entry.card_number = card_number;
        entry.user_name = user_name;
        entry.refresh_display();
        entry
    }

    pub fn user_name(name: impl Into<String>) -> Self {
        let mut entry = Self::empty(EntryKind::UserName);
        entry.user_name = Some(name.into());
        entry.refresh_display();
        entry
    }

    /// An entry the classifier could not place; `display` keeps the normalized text.
    pub fn unknown(normalized: impl Into<String>) -> Self {
        let mut entry = Self::empty(EntryKind::Unknown);
        entry.display = normalized.into();
        entry
    }

    fn empty(kind: EntryKind) -> Self {
        Self {
            kind,
            amount: None,
            currency: None,
            card_name: None,
            card_number: None,
            user_name: None,
            no_debt: false,
            display: String::new(),
        }
    }

    /// The amount, or zero when there is none.
    pub fn amount_or_zero(&self) -> Decimal {
        self.amount.unwrap_or_default()
    }

    /// Recomputes `display` after a field changed.
    pub fn refresh_display(&mut self) {
        self.display = match self.kind {
            EntryKind::Crypto | EntryKind::Cash => {
                let amount = self.amount.map(format_amount).unwrap_or_default();
                let mut s = match &self.currency {
                    Some(currency) => format!("{amount} {currency}"),
                    None => amount,
                };
                if self.no_debt {
                    s.push_str(" (no debt)");
                }
                s
            }
            EntryKind::CardRef => {
                let mut parts = vec![self.card_name.clone().unwrap_or_default()];
                if let Some(number) = &self.card_number {
                    parts.push(number.clone());
                }
                if let Some(name) = &self.user_name {
                    parts.push(format!("({name})"));
                }
                parts.join(" ")
            }
            EntryKind::UserName => format!("({})", self.user_name.as_deref().unwrap_or_default()),
            EntryKind::Unknown => self.display.clone(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            ClassifiedEntry::crypto(Decimal::new(8, 3), "BTC").display,
            "0.008 BTC"
        );
        assert_eq!(
            ClassifiedEntry::cash(Decimal::from(5000), "RUB", true).display,
            "5000 RUB (no debt)"
        );
        assert_eq!(
            ClassifiedEntry::card(
                "SBER",
                Some("2202 2000 1111 2222".to_string()),
                Some("Jane K.".to_string())
            )
            .display,
            "SBER 2202 2000 1111 2222 (Jane K.)"
        );
        assert_eq!(ClassifiedEntry::user_name("Jane K.").display, "(Jane K.)");
        assert_eq!(ClassifiedEntry::unknown("hello there").display, "hello there");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(EntryKind::CardRef.to_string(), "card_ref");
        assert_eq!("crypto".parse::<EntryKind>().unwrap(), EntryKind::Crypto);
    }
}
