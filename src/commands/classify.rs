use crate::classify::{Classifier, ClassifierSettings};
use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::model::{ClassifiedEntry, EntryKind};
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;
use tracing::debug;

/// Classifies each of `texts` and returns the entries as JSON. Uses the classifier settings of
/// the configuration in `home` when there is one, the defaults otherwise.
pub async fn classify(home: &Path, texts: &[String]) -> Result<Out<Vec<ClassifiedEntry>>> {
    let settings = if home.join("config.json").is_file() {
        Config::load(home).await?.classifier_settings().clone()
    } else {
        debug!("No configuration in {}, using default classifier settings", home.display());
        ClassifierSettings::default()
    };
    let classifier = Classifier::new(settings);
    let entries: Vec<ClassifiedEntry> = texts
        .iter()
        .map(|text| {
            let entry = classifier.classify(text);
            if entry.kind == EntryKind::Unknown {
                classifier.reclassify(text).unwrap_or(entry)
            } else {
                entry
            }
        })
        .collect();
    let json = serde_json::to_string_pretty(&entries)
        .context("Unable to serialize the classification")
        .pub_result(ErrorType::Io)?;
    Ok(Out::new(json, entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_classify_without_config() {
        let dir = TempDir::new().unwrap();
        let texts = vec!["0.008".to_string(), "5000".to_string()];
        let out = classify(dir.path(), &texts).await.unwrap();
        let entries = out.structure().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Crypto);
        assert_eq!(entries[0].amount, Some(Decimal::new(8, 3)));
        assert_eq!(entries[1].kind, EntryKind::Cash);
        assert!(out.message().contains("\"crypto\""));
    }
}
