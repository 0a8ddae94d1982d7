//! The `mcqeval import` command.

use std::path::PathBuf;

use anyhow::Result;

use mcqeval_core::parser::{load_question_sets, validate_question_set};
use mcqeval_core::store::JsonFileStore;

pub async fn execute(
    questions_path: PathBuf,
    store: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let (_, store_dir) = super::load_with_store(config_path.as_deref(), store)?;
    let sets = load_question_sets(&questions_path)?;
    anyhow::ensure!(
        !sets.is_empty(),
        "no question sets found at {}",
        questions_path.display()
    );

    let store = JsonFileStore::open(&store_dir).await?;

    let mut imported = 0;
    for set in sets {
        let warnings = validate_question_set(&set);
        if !warnings.is_empty() {
            tracing::warn!(
                set = %set.name,
                "{} validation warning(s); run `mcqeval validate` for details",
                warnings.len()
            );
        }
        let name = set.name.clone();
        let domain = set.domain;
        let count = store.insert_many(set.questions).await?;
        println!("Imported {count} question(s) from {name} into {domain}");
        imported += count;
    }

    println!(
        "\n{imported} question(s) imported; store at {} now holds {}.",
        store.dir().display(),
        store.len().await
    );

    Ok(())
}
