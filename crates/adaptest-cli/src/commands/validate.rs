//! The `adaptest validate` command.

use std::path::PathBuf;

use anyhow::Result;

use adaptest_core::config::load_config_from;
use adaptest_core::model::Category;
use adaptest_core::parser;

pub fn execute(bank_path: PathBuf, locale: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let locale = locale.as_deref();

    let banks = if bank_path.is_dir() {
        parser::load_bank_directory(&bank_path, locale)?
    } else {
        vec![parser::parse_item_bank(&bank_path, locale)?]
    };
    anyhow::ensure!(!banks.is_empty(), "no valid item banks found in {}", bank_path.display());

    let mut total_warnings = 0;

    for bank in &banks {
        println!(
            "Item bank: {} ({} items, locale {})",
            bank.name(),
            bank.len(),
            bank.locale()
        );
        let counts: Vec<String> = Category::ALL
            .iter()
            .map(|&c| format!("{c} {}", bank.count_in(c)))
            .collect();
        println!("  {}", counts.join(", "));

        let warnings = parser::validate_item_bank(bank, &config);
        for w in &warnings {
            let prefix = w
                .item_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All item banks valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
