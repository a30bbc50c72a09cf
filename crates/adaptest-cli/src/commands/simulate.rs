//! The `adaptest simulate` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use adaptest_core::config::{load_config_from, EstimationMethod};
use adaptest_core::engine::AdaptiveEngine;
use adaptest_core::parser;
use adaptest_sim::{simulate_batch_with, SimulationPlan, SimulationReport};

pub struct SimulateArgs {
    pub item_bank: PathBuf,
    pub thetas: String,
    pub replications: usize,
    pub seed: u64,
    pub method: Option<String>,
    pub save_sessions: Option<PathBuf>,
    pub format: String,
    pub locale: Option<String>,
    pub config: Option<PathBuf>,
}

pub fn execute(args: SimulateArgs) -> Result<()> {
    anyhow::ensure!(args.replications >= 1, "replications must be at least 1");

    let mut config = load_config_from(args.config.as_deref())?;
    if let Some(method) = &args.method {
        config.estimation.method = method
            .parse::<EstimationMethod>()
            .map_err(anyhow::Error::msg)?;
    }

    let bank = parser::parse_item_bank(&args.item_bank, args.locale.as_deref())?;
    tracing::info!(
        bank = bank.id(),
        items = bank.len(),
        method = %config.estimation.method,
        "loaded item bank"
    );
    let engine = AdaptiveEngine::new(Arc::new(bank), config)?;

    let plan = SimulationPlan {
        true_thetas: parse_thetas(&args.thetas)?,
        replications: args.replications,
        seed: args.seed,
    };

    if let Some(dir) = &args.save_sessions {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let mut saved = 0usize;
    let report = simulate_batch_with(&engine, &plan, |_, session| {
        if let Some(dir) = &args.save_sessions {
            saved += 1;
            session.save_json(&dir.join(format!("session-{saved:05}.json")))?;
        }
        Ok(())
    })?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_summary(&report),
    }

    if let Some(dir) = &args.save_sessions {
        eprintln!("Saved {saved} session(s) to {}", dir.display());
    }

    Ok(())
}

fn parse_thetas(list: &str) -> Result<Vec<f64>> {
    let thetas = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .with_context(|| format!("invalid theta '{s}'"))
                .and_then(|t| {
                    anyhow::ensure!(t.is_finite(), "theta must be finite, got {t}");
                    Ok(t)
                })
        })
        .collect::<Result<Vec<_>>>()?;
    anyhow::ensure!(!thetas.is_empty(), "no abilities given to simulate");
    Ok(thetas)
}

fn print_summary(report: &SimulationReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "True theta",
        "Mean estimate",
        "Bias",
        "RMSE",
        "Avg items",
        "Avg SE",
    ]);

    for s in &report.summaries {
        table.add_row(vec![
            Cell::new(format!("{:+.2}", s.true_theta)),
            Cell::new(format!("{:+.3}", s.mean_estimate)),
            Cell::new(format!("{:+.3}", s.bias)),
            Cell::new(format!("{:.3}", s.rmse)),
            Cell::new(format!("{:.1}", s.mean_items)),
            Cell::new(format!("{:.3}", s.mean_se)),
        ]);
    }

    println!(
        "Bank {} ({}, seed {})",
        report.bank_id, report.method, report.seed
    );
    println!("{table}");
    println!("Overall RMSE: {:.3}", report.overall_rmse());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_theta_lists() {
        assert_eq!(parse_thetas("-2, 0,1.5").unwrap(), vec![-2.0, 0.0, 1.5]);
        assert!(parse_thetas("").is_err());
        assert!(parse_thetas("0,abc").is_err());
        assert!(parse_thetas("inf").is_err());
    }
}
