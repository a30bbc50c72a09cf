//! The `adaptest score` command.

use std::path::PathBuf;

use anyhow::Result;

use adaptest_core::config::load_config_from;
use adaptest_core::report::AssessmentResult;
use adaptest_core::scoring;
use adaptest_core::session::Session;

pub fn execute(
    session_path: PathBuf,
    format: String,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut session = Session::load_json(&session_path)?;
    if let Some(path) = config_path {
        let config = load_config_from(Some(&path))?;
        session.config.scoring = config.scoring;
    }

    let result = scoring::finalize(&session)?;

    match format.as_str() {
        "markdown" | "md" => println!("{}", result.to_markdown()),
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_result(&result),
    }

    if let Some(path) = output {
        result.save_json(&path)?;
        eprintln!("Result written to {}", path.display());
    }

    Ok(())
}

fn print_result(result: &AssessmentResult) {
    use comfy_table::{Cell, Table};

    let ci = &result.confidence_interval;
    println!(
        "IQ {:.0} ({}), {:.0}% CI [{:.0}, {:.0}], percentile {:.1}",
        result.iq,
        result.iq_band,
        ci.level * 100.0,
        ci.lower,
        ci.upper,
        result.percentile
    );
    println!(
        "theta {:+.3}  SE {:.3}  ({} of {} correct, {})",
        result.theta, result.se, result.total_correct, result.items_answered, result.status
    );

    let mut table = Table::new();
    table.set_header(vec!["Category", "Answered", "Correct", "Accuracy"]);
    for (category, score) in &result.category_scores {
        table.add_row(vec![
            Cell::new(category),
            Cell::new(score.administered),
            Cell::new(score.correct),
            Cell::new(
                score
                    .accuracy
                    .map(|a| format!("{a:.1}%"))
                    .unwrap_or_else(|| "n/a".into()),
            ),
        ]);
    }
    println!("{table}");

    let r = &result.reliability;
    println!(
        "Reliability: split-half {}, marginal {:.3}, precision {:.2}",
        r.internal_consistency
            .map(|v| format!("{v:.3}"))
            .unwrap_or_else(|| "n/a".into()),
        r.marginal,
        r.precision
    );
}
