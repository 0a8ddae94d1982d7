//! The `mcqeval analyze` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use mcqeval_core::statistics::{analyze, DomainAnalysis};
use mcqeval_core::store::JsonFileStore;

use crate::OutputFormat;

pub async fn execute(
    store: Option<PathBuf>,
    format: OutputFormat,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let (_, store_dir) = super::load_with_store(config_path.as_deref(), store)?;
    let store = JsonFileStore::open(&store_dir).await?;
    let results = analyze(&store).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        OutputFormat::Table if results.is_empty() => {
            println!(
                "No questions in {}. Load some with `mcqeval import`.",
                store_dir.display()
            );
        }
        OutputFormat::Table => println!("{}", summary_table(&results)),
    }

    Ok(())
}

pub(crate) fn summary_table(results: &[DomainAnalysis]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Domain",
        "Questions",
        "Evaluated",
        "Correct",
        "Accuracy",
        "Avg Latency",
    ]);

    for analysis in results {
        table.add_row(vec![
            Cell::new(analysis.domain),
            Cell::new(analysis.count),
            Cell::new(analysis.evaluated),
            Cell::new(analysis.correct),
            Cell::new(format!("{:.1}%", analysis.accuracy * 100.0)),
            Cell::new(format!("{:.0}ms", analysis.avg_response_time)),
        ]);
    }

    table
}
