//! The `mcqeval init` command.

use std::path::Path;

use anyhow::{Context, Result};

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("mcqeval.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("questions").context("failed to create questions/")?;
    write_if_missing(Path::new("questions/history.toml"), EXAMPLE_QUESTION_SET)?;

    println!("\nNext steps:");
    println!("  1. Edit mcqeval.toml with your API keys");
    println!("  2. Run: mcqeval validate --questions questions");
    println!("  3. Run: mcqeval import --questions questions");
    println!("  4. Run: mcqeval run --quick");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# mcqeval configuration

default_provider = "openai"
default_model = "gpt-4o"
temperature = 0.0
max_tokens = 16
max_retries = 3
store_dir = "./mcqeval-data"
quick_sample_size = 50

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.gemini]
type = "gemini"
api_key = "${GEMINI_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

# Offline service for dry runs: always answers "A".
[providers.offline]
type = "mock"
response = "A"
"#;

const EXAMPLE_QUESTION_SET: &str = r#"[question_set]
name = "History sampler"
domain = "History"

[[questions]]
id = "hist-magna-carta"
question = "In which year was the Magna Carta sealed?"
answer = "B"

[questions.choices]
A = "1066"
B = "1215"
C = "1492"
D = "1776"

[[questions]]
id = "hist-berlin-wall"
question = "In which year did the Berlin Wall fall?"
answer = "C"

[questions.choices]
A = "1961"
B = "1975"
C = "1989"
D = "1991"

[[questions]]
id = "hist-rosetta"
question = "Which artifact was key to deciphering Egyptian hieroglyphs?"
answer = "A"

[questions.choices]
A = "The Rosetta Stone"
B = "The Dead Sea Scrolls"
C = "The Code of Hammurabi"
D = "The Behistun Inscription"
"#;
