//! Turns one free-form text fragment into a `ClassifiedEntry`.
//!
//! Classification is a pure, ordered list of rules; the first rule that matches wins:
//!
//! 1. Whitespace is collapsed and the text trimmed.
//! 2. **Card reference**: a known brand keyword, or a `1234 5678 9012 3456` number together with
//!    a `(Name I.)` parenthetical.
//! 3. **Crypto**: a standalone decimal token with a fractional part. The currency class is picked
//!    by magnitude.
//! 4. **Cash**: text that does not look like a card and starts with an integer token, optionally
//!    followed by more integers and a "no debt" phrase. The bucket is picked by magnitude.
//! 5. **Card name only**: 2-10 upper case letters.
//! 6. **User name**: a lone `(Name I.)`.
//! 7. Otherwise `Unknown`, carrying the normalized text.
//!
//! The heuristics are deliberately loose; an operator corrects amounts and currencies during
//! review. `reclassify` is a second, narrower pass the session aggregator runs when the first
//! pass returns `Unknown`.

use crate::model::{parse_amount, ClassifiedEntry};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

/// Placeholder card label used when a card is recognised structurally but carries no name.
pub const PLACEHOLDER_CARD: &str = "CARD";

/// Tunable parts of classification.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Card brand keywords, matched as whole words, case-insensitively and ignoring diacritics.
    pub brand_keywords: Vec<String>,
    /// Crypto class for tiny amounts and the default class.
    pub btc_class: String,
    /// Crypto class for amounts in `[0.1, 10]`.
    pub ltc_class: String,
    /// Cash bucket for amounts below 1000.
    pub small_cash_bucket: String,
    /// Cash bucket for amounts of 1000 and above.
    pub large_cash_bucket: String,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            brand_keywords: [
                "sber", "сбер", "tinkoff", "тинькофф", "тинькоф", "tbank", "т-банк", "alfa",
                "альфа", "vtb", "втб", "raif", "райф", "ozon", "озон", "gazprom", "газпром",
                "sovcom", "совком", "visa", "mastercard",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            btc_class: "BTC".to_string(),
            ltc_class: "LTC".to_string(),
            small_cash_bucket: "USD".to_string(),
            large_cash_bucket: "RUB".to_string(),
        }
    }
}

/// The fragment classifier. Cheap to clone; holds no state besides its settings.
#[derive(Debug, Clone)]
pub struct Classifier {
    settings: ClassifierSettings,
    /// `(folded, original)` keyword pairs.
    keywords: Vec<(String, String)>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierSettings::default())
    }
}

impl Classifier {
    pub fn new(settings: ClassifierSettings) -> Self {
        let keywords = settings
            .brand_keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| (fold(k.trim()), k.trim().to_string()))
            .collect();
        Self { settings, keywords }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    /// Classifies `text`. Never fails; the worst case is an `Unknown` entry.
    pub fn classify(&self, text: &str) -> ClassifiedEntry {
        let normalized = normalize(text);
        let entry = self.classify_normalized(&normalized);
        debug!("Classified '{normalized}' as {}", entry.kind);
        entry
    }

    fn classify_normalized(&self, text: &str) -> ClassifiedEntry {
        if text.is_empty() {
            return ClassifiedEntry::unknown(text);
        }
        if let Some(card) = self.card_reference(text) {
            return card;
        }
        if let Some(crypto) = self.crypto_token(text) {
            return crypto;
        }
        if let Some(cash) = self.cash_amount(text) {
            return cash;
        }
        if card_name_only_re().is_match(text) {
            return ClassifiedEntry::card(text, None, None);
        }
        if let Some(caps) = user_name_only_re().captures(text) {
            return ClassifiedEntry::user_name(collapse_name(&caps[1]));
        }
        ClassifiedEntry::unknown(text)
    }

    /// The narrower second pass: the first decimal-with-fraction anywhere in the text, then the
    /// first integer anywhere. Returns `None` when neither yields a positive amount.
    pub fn reclassify(&self, text: &str) -> Option<ClassifiedEntry> {
        let normalized = normalize(text);
        if let Some(m) = any_decimal_re().find(&normalized) {
            if let Some(amount) = positive_amount(m.as_str()) {
                debug!("Reclassified '{normalized}' as crypto {amount}");
                return Some(ClassifiedEntry::crypto(amount, self.crypto_class(amount)));
            }
        }
        if let Some(m) = any_integer_re().find(&normalized) {
            if let Some(amount) = positive_amount(m.as_str()) {
                debug!("Reclassified '{normalized}' as cash {amount}");
                return Some(ClassifiedEntry::cash(
                    amount,
                    self.cash_bucket(amount),
                    has_no_debt(&normalized),
                ));
            }
        }
        None
    }

    /// Crypto class by magnitude: below 0.01 and the default is the BTC class, `[0.1, 10]` is
    /// the LTC class.
    pub fn crypto_class(&self, amount: Decimal) -> &str {
        if amount < Decimal::new(1, 2) {
            &self.settings.btc_class
        } else if amount >= Decimal::new(1, 1) && amount <= Decimal::TEN {
            &self.settings.ltc_class
        } else {
            &self.settings.btc_class
        }
    }

    /// Cash bucket by magnitude: below 1000 is the small bucket.
    pub fn cash_bucket(&self, amount: Decimal) -> &str {
        if amount < Decimal::ONE_THOUSAND {
            &self.settings.small_cash_bucket
        } else {
            &self.settings.large_cash_bucket
        }
    }

    fn card_reference(&self, text: &str) -> Option<ClassifiedEntry> {
        let folded = fold(text);
        let keyword = self
            .keywords
            .iter()
            .find(|(folded_kw, _)| contains_word(&folded, folded_kw))
            .map(|(_, original)| original.as_str());
        let number = card_number_re()
            .captures(text)
            .map(|c| group_card_number(&c[1]));
        let name = paren_name_re()
            .captures(text)
            .map(|c| collapse_name(&c[1]));

        let label = match keyword {
            Some(kw) => first_caps_token(text).unwrap_or_else(|| kw.to_uppercase()),
            None if number.is_some() && name.is_some() => {
                first_caps_token(text).unwrap_or_else(|| PLACEHOLDER_CARD.to_string())
            }
            None => return None,
        };
        Some(ClassifiedEntry::card(label, number, name))
    }

    fn crypto_token(&self, text: &str) -> Option<ClassifiedEntry> {
        let amount = text
            .split(' ')
            .filter(|token| decimal_token_re().is_match(token))
            .find_map(positive_amount)?;
        Some(ClassifiedEntry::crypto(amount, self.crypto_class(amount)))
    }

    fn cash_amount(&self, text: &str) -> Option<ClassifiedEntry> {
        if card_number_re().is_match(text) || paren_name_re().is_match(text) {
            return None;
        }
        let caps = cash_re().captures(text)?;
        let amount = positive_amount(&caps[1])?;
        let no_debt = caps.get(2).is_some();
        Some(ClassifiedEntry::cash(
            amount,
            self.cash_bucket(amount),
            no_debt,
        ))
    }
}

/// Collapses runs of whitespace (including newlines) into single spaces and trims.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-cases and strips the diacritics that commonly differ between how a brand is typed and
/// how it is configured.
pub fn fold(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'ё' => 'е',
            'й' => 'и',
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' => 'a',
            'ç' | 'č' | 'ć' => 'c',
            'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ě' => 'e',
            'ì' | 'í' | 'î' | 'ï' | 'ī' => 'i',
            'ñ' | 'ń' | 'ň' => 'n',
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => 'o',
            'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' => 'u',
            'ý' | 'ÿ' => 'y',
            'š' | 'ś' => 's',
            'ž' | 'ź' | 'ż' => 'z',
            'ř' => 'r',
            other => other,
        })
        .collect()
}

/// Suffixes a brand keyword may be glued to, as in "Сбербанк".
const BANK_SUFFIXES: [&str; 2] = ["bank", "банк"];

/// Whether `word` occurs in `text` with no letter directly before or after it. Digits may touch
/// the word ("sber4276") and so may a bank suffix.
fn contains_word(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let rest = &text[start + word.len()..];
        let rest = BANK_SUFFIXES
            .iter()
            .find_map(|suffix| rest.strip_prefix(suffix))
            .unwrap_or(rest);
        !before.is_some_and(char::is_alphabetic) && !rest.chars().next().is_some_and(char::is_alphabetic)
    })
}

fn positive_amount(text: &str) -> Option<Decimal> {
    parse_amount(text).ok().filter(|a| *a > Decimal::ZERO)
}

fn has_no_debt(text: &str) -> bool {
    no_debt_re().is_match(text)
}

fn first_caps_token(text: &str) -> Option<String> {
    caps_token_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .next()
}

/// Re-groups a card number as four space-separated blocks of four digits.
fn group_card_number(raw: &str) -> String {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

fn collapse_name(raw: &str) -> String {
    normalize(raw)
}

fn card_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{4}[ -]?\d{4}[ -]?\d{4}[ -]?\d{4})\b").expect("invalid card number regex")
    })
}

const NAME_PATTERN: &str = r"\p{Lu}\p{Ll}+(?:[ -]\p{Lu}\p{Ll}+)?\s+\p{Lu}\.?";

fn paren_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"\(\s*({NAME_PATTERN})\s*\)")).expect("invalid name regex")
    })
}

fn user_name_only_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^\(\s*({NAME_PATTERN})\s*\)$")).expect("invalid user name regex")
    })
}

fn decimal_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+[.,]\d+$").expect("invalid decimal token regex"))
}

fn cash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(\d+)(?: \d+)*( (?:без долга|no debt))?$").expect("invalid cash regex")
    })
}

fn no_debt_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)без долга|no debt").expect("invalid no debt regex"))
}

fn card_name_only_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\p{Lu}{2,10}$").expect("invalid card name regex"))
}

fn caps_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\p{Lu}{2,10}\b").expect("invalid caps token regex"))
}

fn any_decimal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+[.,]\d+").expect("invalid decimal regex"))
}

fn any_integer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("invalid integer regex"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryKind;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  0.008 \n\n BTC\t"), "0.008 BTC");
        assert_eq!(normalize("\n"), "");
    }

    #[test]
    fn test_crypto_by_magnitude() {
        let c = Classifier::default();

        let e = c.classify("0.008");
        assert_eq!(e.kind, EntryKind::Crypto);
        assert_eq!(e.amount, Some(dec("0.008")));
        assert_eq!(e.currency.as_deref(), Some("BTC"));

        let e = c.classify("0.8");
        assert_eq!(e.kind, EntryKind::Crypto);
        assert_eq!(e.currency.as_deref(), Some("LTC"));

        let e = c.classify("10.0");
        assert_eq!(e.currency.as_deref(), Some("LTC"));

        // Between the two bands falls back to the default class
        let e = c.classify("0.05");
        assert_eq!(e.currency.as_deref(), Some("BTC"));

        let e = c.classify("12.5");
        assert_eq!(e.currency.as_deref(), Some("BTC"));

        let e = c.classify("получено 0,35 сегодня");
        assert_eq!(e.kind, EntryKind::Crypto);
        assert_eq!(e.amount, Some(dec("0.35")));
        assert_eq!(e.currency.as_deref(), Some("LTC"));
    }

    #[test]
    fn test_cash_by_magnitude() {
        let c = Classifier::default();

        let e = c.classify("5000");
        assert_eq!(e.kind, EntryKind::Cash);
        assert_eq!(e.amount, Some(dec("5000")));
        assert_eq!(e.currency.as_deref(), Some("RUB"));

        let e = c.classify("500");
        assert_eq!(e.kind, EntryKind::Cash);
        assert_eq!(e.currency.as_deref(), Some("USD"));
        assert!(!e.no_debt);

        let e = c.classify("1500 200 без долга");
        assert_eq!(e.kind, EntryKind::Cash);
        assert_eq!(e.amount, Some(dec("1500")));
        assert!(e.no_debt);
    }

    #[test]
    fn test_zero_is_not_an_amount() {
        let c = Classifier::default();
        assert_eq!(c.classify("0").kind, EntryKind::Unknown);
        assert_eq!(c.classify("0.00").kind, EntryKind::Unknown);
    }

    #[test]
    fn test_card_with_structure_wins_over_decimal() {
        let c = Classifier::default();
        let e = c.classify("2202 2062 1234 5678 (Jane K.) 0.008");
        assert_eq!(e.kind, EntryKind::CardRef);
        assert_eq!(e.card_number.as_deref(), Some("2202 2062 1234 5678"));
        assert_eq!(e.user_name.as_deref(), Some("Jane K."));
        assert_eq!(e.card_name.as_deref(), Some(PLACEHOLDER_CARD));

        let e = c.classify("2202206212345678\n(Иван П.)\n1.5");
        assert_eq!(e.kind, EntryKind::CardRef);
        assert_eq!(e.card_number.as_deref(), Some("2202 2062 1234 5678"));
        assert_eq!(e.user_name.as_deref(), Some("Иван П."));
    }

    #[test]
    fn test_card_label_from_caps_token() {
        let c = Classifier::default();
        let e = c.classify("MONO 4441-1111-2222-3333 (Petro S.)");
        assert_eq!(e.kind, EntryKind::CardRef);
        assert_eq!(e.card_name.as_deref(), Some("MONO"));
    }

    #[test]
    fn test_card_by_brand_keyword() {
        let c = Classifier::default();
        let e = c.classify("Сбер 2202 2000 1111 2222");
        assert_eq!(e.kind, EntryKind::CardRef);
        assert_eq!(e.card_name.as_deref(), Some("СБЕР"));
        assert_eq!(e.card_number.as_deref(), Some("2202 2000 1111 2222"));
        assert_eq!(e.user_name, None);

        let e = c.classify("SBER");
        assert_eq!(e.kind, EntryKind::CardRef);
        assert_eq!(e.card_name.as_deref(), Some("SBER"));

        // Diacritics in the typed brand do not matter
        let e = c.classify("tinkóff black");
        assert_eq!(e.kind, EntryKind::CardRef);
        assert_eq!(e.card_name.as_deref(), Some("TINKOFF"));
    }

    #[test]
    fn test_brand_keyword_needs_word_boundary() {
        let c = Classifier::default();
        let e = c.classify("(Visarion K.)");
        assert_eq!(e.kind, EntryKind::UserName);
        assert_eq!(e.user_name.as_deref(), Some("Visarion K."));
        assert_eq!(c.classify("(Alfaro M.)").kind, EntryKind::UserName);
        assert_eq!(c.classify("Vtbx").kind, EntryKind::Unknown);

        assert_eq!(c.classify("Сбербанк").kind, EntryKind::CardRef);
        assert_eq!(c.classify("alfa-bank").kind, EntryKind::CardRef);
        assert_eq!(c.classify("sber4276").kind, EntryKind::CardRef);
    }

    #[test]
    fn test_card_number_alone_is_not_cash() {
        let c = Classifier::default();
        let e = c.classify("2202 2000 1111 2222");
        assert_ne!(e.kind, EntryKind::Cash);
    }

    #[test]
    fn test_card_name_only() {
        let c = Classifier::default();
        let e = c.classify("  QIWI ");
        assert_eq!(e.kind, EntryKind::CardRef);
        assert_eq!(e.card_name.as_deref(), Some("QIWI"));
        assert_eq!(e.card_number, None);
        assert_eq!(c.classify("ABCDEFGHIJK").kind, EntryKind::Unknown);
    }

    #[test]
    fn test_user_name() {
        let c = Classifier::default();
        let e = c.classify("(Jane K.)");
        assert_eq!(e.kind, EntryKind::UserName);
        assert_eq!(e.user_name.as_deref(), Some("Jane K."));
        assert_eq!(e.display, "(Jane K.)");
    }

    #[test]
    fn test_unknown_keeps_normalized_text() {
        let c = Classifier::default();
        let e = c.classify("hello\n  world");
        assert_eq!(e.kind, EntryKind::Unknown);
        assert_eq!(e.display, "hello world");
    }

    #[test]
    fn test_reclassify() {
        let c = Classifier::default();

        // Glued to a word, so the first pass misses it
        assert_eq!(c.classify("≈0.008btc").kind, EntryKind::Unknown);
        let e = c.reclassify("≈0.008btc").unwrap();
        assert_eq!(e.kind, EntryKind::Crypto);
        assert_eq!(e.currency.as_deref(), Some("BTC"));

        assert_eq!(c.classify("перевод 3000р").kind, EntryKind::Unknown);
        let e = c.reclassify("перевод 3000р").unwrap();
        assert_eq!(e.kind, EntryKind::Cash);
        assert_eq!(e.amount, Some(dec("3000")));
        assert_eq!(e.currency.as_deref(), Some("RUB"));

        assert!(c.reclassify("nothing here").is_none());
    }

    #[test]
    fn test_custom_settings() {
        let settings = ClassifierSettings {
            brand_keywords: vec!["acme".to_string()],
            btc_class: "XBT".to_string(),
            ..Default::default()
        };
        let c = Classifier::new(settings);
        assert_eq!(c.classify("acme card").kind, EntryKind::CardRef);
        assert_eq!(c.classify("sber card").kind, EntryKind::Unknown);
        assert_eq!(c.classify("0.001").currency.as_deref(), Some("XBT"));
    }
}
