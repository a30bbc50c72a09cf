//! The `adaptest init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    // Create adaptest.toml
    if std::path::Path::new("adaptest.toml").exists() {
        println!("adaptest.toml already exists, skipping.");
    } else {
        std::fs::write("adaptest.toml", SAMPLE_CONFIG)?;
        println!("Created adaptest.toml");
    }

    // Create example item bank
    std::fs::create_dir_all("item-banks")?;
    let example_path = std::path::Path::new("item-banks/example.toml");
    if example_path.exists() {
        println!("item-banks/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_ITEM_BANK)?;
        println!("Created item-banks/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit adaptest.toml to set stop rules and category targets");
    println!("  2. Run: adaptest validate --item-bank item-banks/example.toml");
    println!("  3. Run: adaptest simulate --item-bank item-banks/example.toml --replications 20");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# adaptest configuration

[termination]
min_items = 5
max_items = 20
precision_threshold = 0.3
time_limit_secs = 1800
default_item_time_limit_secs = 90

[estimation]
method = "eap"            # or "mle"
prior_mean = 0.0
prior_sd = 1.0
# initial_se = 1.0        # default: prior_sd for eap, ability range width for mle
ability_min = -4.0
ability_max = 4.0
step_size = 0.7
quadrature_points = 61

[selection]
exposure_control = true

# Share of the item budget per category. Omit to balance equally.
# [selection.category_targets]
# pattern-recognition = 0.2
# spatial-reasoning = 0.2
# logical-deduction = 0.2
# numerical-reasoning = 0.2
# short-term-memory = 0.2

[scoring]
confidence_level = 0.95
iq_min = 40.0
iq_max = 200.0
"#;

const EXAMPLE_ITEM_BANK: &str = r#"[item_bank]
id = "example"
name = "Example Item Bank"
default_locale = "en"

[[items]]
id = "pr-01"
category = "pattern-recognition"
difficulty = 4
a = 1.1
b = -0.8
correct_option = 2

[items.content.en]
prompt = "What comes next: 2, 4, 8, 16, ?"
options = ["18", "24", "32", "64"]
explanation = "Each term doubles."

[items.content.de]
prompt = "Was kommt als Nächstes: 2, 4, 8, 16, ?"
options = ["18", "24", "32", "64"]
explanation = "Jedes Glied verdoppelt sich."

[[items]]
id = "sr-01"
category = "spatial-reasoning"
difficulty = 5
a = 1.3
b = 0.0
correct_option = 1

[items.content.en]
prompt = "An arrow pointing up is rotated 90 degrees clockwise. Which way does it point?"
options = ["up", "right", "down", "left"]

[[items]]
id = "ld-01"
category = "logical-deduction"
difficulty = 6
a = 1.0
b = 0.5
correct_option = 0

[items.content.en]
prompt = "All glorps are blue. Tem is a glorp. Is Tem blue?"
options = ["Yes", "No", "Cannot be determined", "Only sometimes"]

[[items]]
id = "nr-01"
category = "numerical-reasoning"
difficulty = 5
a = 0.9
b = 0.2
correct_option = 0

[items.content.en]
prompt = "What is 15% of 80?"
options = ["12", "15", "8", "10"]
explanation = "80 x 0.15 = 12."

[[items]]
id = "sm-01"
category = "short-term-memory"
difficulty = 7
a = 1.4
b = 1.1
correct_option = 3
time_limit_secs = 30

[items.content.en]
prompt = "Memorize: 4 9 1 7 3. Which digit was fourth?"
options = ["9", "1", "3", "7"]
"#;
