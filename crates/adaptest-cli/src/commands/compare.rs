//! The `adaptest compare` command.

use std::path::PathBuf;

use anyhow::Result;

use adaptest_core::report::{AssessmentResult, ChangeDirection};

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    fail_on_change: bool,
    format: String,
) -> Result<()> {
    let baseline = AssessmentResult::load_json(&baseline_path)?;
    let current = AssessmentResult::load_json(&current_path)?;

    let report = current.compare(&baseline);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", report.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            let verdict = match report.direction {
                ChangeDirection::Improved => "reliable improvement",
                ChangeDirection::Declined => "reliable decline",
                ChangeDirection::Unchanged => "no reliable change",
            };
            println!(
                "Comparison: theta {:+.3} -> {:+.3} ({:+.3}), IQ {:+.1}, RCI {:.2}: {verdict}",
                report.baseline_theta,
                report.current_theta,
                report.theta_delta,
                report.iq_delta,
                report.reliable_change_index
            );

            let changed: Vec<_> = report
                .category_changes
                .iter()
                .filter_map(|c| c.delta.map(|d| (c, d)))
                .collect();
            if !changed.is_empty() {
                println!("\nCategories:");
                for (c, delta) in changed {
                    println!(
                        "  {} {:.1}% -> {:.1}% ({:+.1}%)",
                        c.category,
                        c.baseline.unwrap_or_default(),
                        c.current.unwrap_or_default(),
                        delta
                    );
                }
            }
        }
    }

    if fail_on_change && report.is_significant() {
        std::process::exit(1);
    }

    Ok(())
}
