//! TOML item bank parser.
//!
//! Loads item banks from TOML files and directories for a requested locale,
//! and reports non-fatal quality warnings. Locale fallback lives here and
//! nowhere else: when an item has no content for the requested locale the
//! English content is used instead.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::bank::ItemBank;
use crate::config::AssessmentConfig;
use crate::error::ItemBankError;
use crate::model::{Category, IrtParams, Item, ItemContent, UsageStats};
use crate::selector::category_caps;

/// Locale used when an item lacks content for the requested one.
pub const FALLBACK_LOCALE: &str = "en";

/// Intermediate TOML structure for parsing item bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    item_bank: TomlBankHeader,
    #[serde(default)]
    items: Vec<TomlItem>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    id: String,
    name: String,
    #[serde(default = "default_locale")]
    default_locale: String,
}

fn default_locale() -> String {
    FALLBACK_LOCALE.to_string()
}

#[derive(Debug, Deserialize)]
struct TomlItem {
    id: String,
    category: String,
    difficulty: u8,
    a: f64,
    b: f64,
    #[serde(default = "default_guessing")]
    c: f64,
    correct_option: usize,
    #[serde(default)]
    time_limit_secs: Option<u64>,
    #[serde(default)]
    usage: UsageStats,
    #[serde(default)]
    content: BTreeMap<String, TomlContent>,
}

fn default_guessing() -> f64 {
    0.25
}

#[derive(Debug, Deserialize)]
struct TomlContent {
    prompt: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    explanation: String,
}

/// Parse a single TOML file into an `ItemBank` for `locale`.
pub fn parse_item_bank(path: &Path, locale: Option<&str>) -> Result<ItemBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read item bank file: {}", path.display()))?;

    parse_item_bank_str(&content, path, locale)
}

/// Parse a TOML string into an `ItemBank` (useful for testing).
///
/// `locale` defaults to the bank's `default_locale`.
pub fn parse_item_bank_str(content: &str, source_path: &Path, locale: Option<&str>) -> Result<ItemBank> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let locale = locale
        .map(str::to_string)
        .unwrap_or(parsed.item_bank.default_locale);

    let items = parsed
        .items
        .into_iter()
        .map(|raw| {
            let category: Category = raw
                .category
                .parse()
                .map_err(|e: String| anyhow::anyhow!("item {}: {}", raw.id, e))?;
            let content = resolve_content(&raw.id, raw.content, &locale)?;
            Ok(Item {
                id: raw.id,
                category,
                difficulty: raw.difficulty,
                params: IrtParams::new(raw.a, raw.b, raw.c),
                correct_option: raw.correct_option,
                time_limit_secs: raw.time_limit_secs,
                usage: raw.usage,
                content,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let bank = ItemBank::new(parsed.item_bank.id, parsed.item_bank.name, locale, items)
        .with_context(|| format!("invalid item bank: {}", source_path.display()))?;
    Ok(bank)
}

fn resolve_content(
    item_id: &str,
    mut content: BTreeMap<String, TomlContent>,
    locale: &str,
) -> Result<ItemContent, ItemBankError> {
    let (resolved, raw) = match content.remove(locale) {
        Some(raw) => (locale, raw),
        None => match content.remove(FALLBACK_LOCALE) {
            Some(raw) => {
                tracing::debug!(item_id, locale, "falling back to {FALLBACK_LOCALE} content");
                (FALLBACK_LOCALE, raw)
            }
            None => {
                return Err(ItemBankError::MissingContent {
                    item_id: item_id.to_string(),
                    locale: locale.to_string(),
                    fallback: FALLBACK_LOCALE.to_string(),
                })
            }
        },
    };
    Ok(ItemContent {
        locale: resolved.to_string(),
        prompt: raw.prompt,
        options: raw.options,
        explanation: raw.explanation,
    })
}

/// Recursively load all `.toml` item bank files from a directory.
pub fn load_bank_directory(dir: &Path, locale: Option<&str>) -> Result<Vec<ItemBank>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            banks.extend(load_bank_directory(&path, locale)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_item_bank(&path, locale) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// A warning from item bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The item ID (if applicable).
    pub item_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Administrations needed before a historical p-value is worth checking.
const MIN_USAGE_FOR_P_VALUE: u64 = 30;

/// Difficulty label implied by `b` on the default -4..4 ability scale.
fn implied_label(b: f64) -> f64 {
    (1.0 + 9.0 * (b + 4.0) / 8.0).clamp(1.0, 10.0)
}

/// Check a loaded bank for problems that do not prevent testing.
pub fn validate_item_bank(bank: &ItemBank, config: &AssessmentConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    for item in bank.items() {
        if !(1..=10).contains(&item.difficulty) {
            warnings.push(ValidationWarning {
                item_id: Some(item.id.clone()),
                message: format!("difficulty label {} outside 1-10", item.difficulty),
            });
        } else if (implied_label(item.params.b) - item.difficulty as f64).abs() > 3.0 {
            warnings.push(ValidationWarning {
                item_id: Some(item.id.clone()),
                message: format!(
                    "difficulty label {} disagrees with calibrated b = {:.2}",
                    item.difficulty, item.params.b
                ),
            });
        }

        if item.params.c > 0.5 {
            warnings.push(ValidationWarning {
                item_id: Some(item.id.clone()),
                message: format!("guessing parameter {:.2} is unusually high", item.params.c),
            });
        }

        let options = item.content.options.len();
        if options > 1 && item.params.c > 0.0 && item.params.c + 0.15 < 1.0 / options as f64 {
            warnings.push(ValidationWarning {
                item_id: Some(item.id.clone()),
                message: format!(
                    "guessing parameter {:.2} is well below chance for {options} options",
                    item.params.c
                ),
            });
        }

        if let Some(p) = item.usage.p_value() {
            if item.usage.times_administered >= MIN_USAGE_FOR_P_VALUE && p < item.params.c {
                warnings.push(ValidationWarning {
                    item_id: Some(item.id.clone()),
                    message: format!(
                        "answered correctly {:.1}% of {} times, below its guessing floor {:.2}",
                        p * 100.0,
                        item.usage.times_administered,
                        item.params.c
                    ),
                });
            }
        }

        if item.content.locale != bank.locale() {
            warnings.push(ValidationWarning {
                item_id: Some(item.id.clone()),
                message: format!(
                    "no '{}' content; serving '{}'",
                    bank.locale(),
                    item.content.locale
                ),
            });
        }
    }

    let caps = category_caps(bank, &config.selection, config.termination.max_items);
    let present: BTreeSet<Category> = bank.categories();
    for (category, cap) in caps {
        let available = bank.count_in(category);
        if available < cap {
            warnings.push(ValidationWarning {
                item_id: None,
                message: if present.contains(&category) {
                    format!("{category} has {available} items but a target of {cap}")
                } else {
                    format!("{category} has a target of {cap} but no items")
                },
            });
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[item_bank]
id = "mini"
name = "Mini Bank"
default_locale = "en"

[[items]]
id = "pr-01"
category = "pattern-recognition"
difficulty = 4
a = 1.1
b = -0.6
correct_option = 2
time_limit_secs = 45

[items.usage]
times_administered = 120
times_correct = 78

[items.content.en]
prompt = "2, 4, 8, 16, ?"
options = ["18", "24", "32", "64"]
explanation = "Each term doubles."

[items.content.de]
prompt = "2, 4, 8, 16, ?"
options = ["18", "24", "32", "64"]
explanation = "Jede Zahl verdoppelt sich."

[[items]]
id = "nr-01"
category = "numerical-reasoning"
difficulty = 6
a = 0.9
b = 0.4
c = 0.2
correct_option = 0

[items.content.en]
prompt = "What is 15% of 80?"
options = ["12", "15", "8", "10", "16"]
"#;

    #[test]
    fn parse_valid_toml() {
        let bank = parse_item_bank_str(VALID_TOML, &PathBuf::from("mini.toml"), None).unwrap();
        assert_eq!(bank.id(), "mini");
        assert_eq!(bank.len(), 2);
        let pr = bank.get("pr-01").unwrap();
        assert_eq!(pr.category, Category::PatternRecognition);
        assert_eq!(pr.params.c, 0.25);
        assert_eq!(pr.usage.times_correct, 78);
        assert_eq!(pr.time_limit_secs, Some(45));
        assert_eq!(bank.get("nr-01").unwrap().params.c, 0.2);
    }

    #[test]
    fn locale_selection_and_fallback() {
        let bank =
            parse_item_bank_str(VALID_TOML, &PathBuf::from("mini.toml"), Some("de")).unwrap();
        assert_eq!(bank.locale(), "de");
        let pr = bank.get("pr-01").unwrap();
        assert_eq!(pr.content.locale, "de");
        assert_eq!(pr.content.explanation, "Jede Zahl verdoppelt sich.");
        let nr = bank.get("nr-01").unwrap();
        assert_eq!(nr.content.locale, "en");

        let warnings = validate_item_bank(&bank, &AssessmentConfig::default());
        assert!(warnings
            .iter()
            .any(|w| w.item_id.as_deref() == Some("nr-01") && w.message.contains("serving 'en'")));
    }

    #[test]
    fn missing_content_fails() {
        let toml = r#"
[item_bank]
id = "x"
name = "X"

[[items]]
id = "only-fr"
category = "logic"
difficulty = 5
a = 1.0
b = 0.0
correct_option = 0

[items.content.fr]
prompt = "?"
options = ["a", "b"]
"#;
        let err = parse_item_bank_str(toml, &PathBuf::from("x.toml"), None).unwrap_err();
        assert!(format!("{err:#}").contains("no content for locale 'en'"));
    }

    #[test]
    fn malformed_item_fails_fast() {
        let toml = VALID_TOML.replace("a = 0.9", "a = -0.9");
        let err = parse_item_bank_str(&toml, &PathBuf::from("bad.toml"), None).unwrap_err();
        let chain = format!("{err:#}");
        assert!(chain.contains("invalid item bank"));
        assert!(chain.contains("discrimination"));
    }

    #[test]
    fn unknown_category_fails() {
        let toml = VALID_TOML.replace("numerical-reasoning", "verbal");
        assert!(parse_item_bank_str(&toml, &PathBuf::from("bad.toml"), None).is_err());
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        assert!(parse_item_bank_str(bad, &PathBuf::from("bad.toml"), None).is_err());
    }

    #[test]
    fn validate_flags_thin_categories() {
        let bank = parse_item_bank_str(VALID_TOML, &PathBuf::from("mini.toml"), None).unwrap();
        let warnings = validate_item_bank(&bank, &AssessmentConfig::default());
        // 20 items split over 2 categories needs 10 per category.
        assert!(warnings
            .iter()
            .any(|w| w.item_id.is_none() && w.message.contains("pattern-recognition has 1 items")));
    }

    #[test]
    fn validate_flags_label_disagreement() {
        let toml = VALID_TOML.replace("difficulty = 4", "difficulty = 10");
        let bank = parse_item_bank_str(&toml, &PathBuf::from("mini.toml"), None).unwrap();
        let warnings = validate_item_bank(&bank, &AssessmentConfig::default());
        assert!(warnings.iter().any(|w| w.message.contains("disagrees")));
    }

    #[test]
    fn validate_flags_usage_below_chance() {
        let bank = parse_item_bank_str(VALID_TOML, &PathBuf::from("mini.toml"), None).unwrap();
        let warnings = validate_item_bank(&bank, &AssessmentConfig::default());
        assert!(!warnings.iter().any(|w| w.message.contains("guessing floor")));

        let toml = VALID_TOML.replace("times_correct = 78", "times_correct = 12");
        let bank = parse_item_bank_str(&toml, &PathBuf::from("mini.toml"), None).unwrap();
        let warnings = validate_item_bank(&bank, &AssessmentConfig::default());
        let warning = warnings
            .iter()
            .find(|w| w.message.contains("guessing floor"))
            .unwrap();
        assert_eq!(warning.item_id.as_deref(), Some("pr-01"));
        assert!(warning.message.contains("10.0% of 120 times"));
    }

    #[test]
    fn load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mini.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "[item_bank]\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let banks = load_bank_directory(dir.path(), None).unwrap();
        assert_eq!(banks.len(), 1);
        assert_eq!(banks[0].id(), "mini");
    }
}
