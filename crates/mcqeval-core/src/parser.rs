//! TOML question-set parser.
//!
//! Loads question sets from TOML files and directories, and validates them.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use uuid::Uuid;

use crate::model::{Domain, ExpectedAnswer, Label, Question};

/// Questions of one domain loaded from a single file.
#[derive(Debug, Clone)]
pub struct QuestionSet {
    /// Human-readable name (defaults to the file stem).
    pub name: String,
    pub domain: Domain,
    pub questions: Vec<Question>,
}

/// Intermediate TOML structure for parsing question-set files.
#[derive(Debug, Deserialize)]
struct TomlQuestionFile {
    question_set: TomlQuestionSetHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlQuestionSetHeader {
    #[serde(default)]
    name: Option<String>,
    domain: String,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    #[serde(default)]
    id: Option<String>,
    question: String,
    answer: String,
    #[serde(default)]
    choices: BTreeMap<String, String>,
}

/// Parse a single TOML file into a `QuestionSet`.
pub fn parse_question_set(path: &Path) -> Result<QuestionSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question set file: {}", path.display()))?;

    parse_question_set_str(&content, path)
}

/// Parse a TOML string into a `QuestionSet` (useful for testing).
pub fn parse_question_set_str(content: &str, source_path: &Path) -> Result<QuestionSet> {
    let parsed: TomlQuestionFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let domain: Domain = parsed
        .question_set
        .domain
        .parse()
        .map_err(|e: String| anyhow::anyhow!("{}: {}", source_path.display(), e))?;

    let questions = parsed
        .questions
        .into_iter()
        .enumerate()
        .map(|(index, q)| {
            let choices = q
                .choices
                .into_iter()
                .map(|(label, text)| {
                    let label: Label = label.parse().map_err(|e: String| {
                        anyhow::anyhow!("question #{} in {}: {}", index + 1, source_path.display(), e)
                    })?;
                    Ok((label, text.trim().to_string()))
                })
                .collect::<Result<BTreeMap<_, _>>>()?;

            Ok(Question {
                id: q
                    .id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                domain,
                question: q.question.trim().to_string(),
                choices,
                expected_answer: ExpectedAnswer::from(q.answer.as_str()),
                evaluation: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let name = parsed.question_set.name.unwrap_or_else(|| {
        source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| domain.to_string())
    });

    Ok(QuestionSet {
        name,
        domain,
        questions,
    })
}

/// Recursively load all `.toml` question-set files from a directory.
pub fn load_question_directory(dir: &Path) -> Result<Vec<QuestionSet>> {
    let mut sets = Vec::new();

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
            sets.extend(load_question_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_question_set(&path) {
                Ok(set) => sets.push(set),
                Err(e) => {
                    tracing::warn!("skipping {}: {e:#}", path.display());
                }
            }
        }
    }

    Ok(sets)
}

/// Load a single file or every file under a directory.
pub fn load_question_sets(path: &Path) -> Result<Vec<QuestionSet>> {
    if path.is_dir() {
        load_question_directory(path)
    } else {
        Ok(vec![parse_question_set(path)?])
    }
}

/// A warning from question-set validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a question set for common issues.
pub fn validate_question_set(set: &QuestionSet) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen_ids = std::collections::HashSet::new();
    for q in &set.questions {
        let warn = |message: String| ValidationWarning {
            question_id: Some(q.id.clone()),
            message,
        };

        if !seen_ids.insert(&q.id) {
            warnings.push(warn(format!("duplicate question ID: {}", q.id)));
        }
        if q.question.is_empty() {
            warnings.push(warn("question text is empty".into()));
        }
        if q.choices.len() < 2 {
            warnings.push(warn(format!(
                "expected at least 2 choices, found {}",
                q.choices.len()
            )));
        }
        if q.choices.values().any(|text| text.is_empty()) {
            warnings.push(warn("a choice has empty text".into()));
        }

        match &q.expected_answer {
            ExpectedAnswer::Label(label) if !q.choices.contains_key(label) => {
                warnings.push(warn(format!("answer {label} is not one of the choices")));
            }
            ExpectedAnswer::Text(text) => {
                let known = q
                    .choices
                    .values()
                    .any(|choice| choice.eq_ignore_ascii_case(text));
                if !known {
                    warnings.push(warn(format!(
                        "answer \"{text}\" is neither a label nor a choice text"
                    )));
                }
            }
            ExpectedAnswer::Label(_) => {}
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[question_set]
name = "Prehistory"
domain = "History"

[[questions]]
id = "hist-001"
question = "Which period came first?"
answer = "b"

[questions.choices]
A = "Bronze Age"
B = "Stone Age"
C = "Iron Age"
D = "Middle Ages"

[[questions]]
question = "Where was the Rosetta Stone found?"
answer = "A"

[questions.choices]
A = "Egypt"
B = "Greece"
"#;

    #[test]
    fn parse_valid_toml() {
        let set = parse_question_set_str(VALID_TOML, &PathBuf::from("prehistory.toml")).unwrap();
        assert_eq!(set.name, "Prehistory");
        assert_eq!(set.domain, Domain::History);
        assert_eq!(set.questions.len(), 2);

        let first = &set.questions[0];
        assert_eq!(first.id, "hist-001");
        assert_eq!(first.expected_answer, ExpectedAnswer::Label(Label::B));
        assert_eq!(first.choices.get(&Label::D).unwrap(), "Middle Ages");

        // Generated ids are UUIDs.
        assert!(Uuid::parse_str(&set.questions[1].id).is_ok());
        assert!(validate_question_set(&set).is_empty());
    }

    #[test]
    fn name_defaults_to_file_stem() {
        let toml = r#"
[question_set]
domain = "computer-security"
"#;
        let set = parse_question_set_str(toml, &PathBuf::from("sec.toml")).unwrap();
        assert_eq!(set.name, "sec");
        assert_eq!(set.domain, Domain::ComputerSecurity);
        assert!(set.questions.is_empty());
    }

    #[test]
    fn unknown_domain_is_an_error() {
        let toml = r#"
[question_set]
domain = "Chemistry"
"#;
        let err = parse_question_set_str(toml, &PathBuf::from("chem.toml")).unwrap_err();
        assert!(err.to_string().contains("unknown domain"));
    }

    #[test]
    fn unknown_choice_label_is_an_error() {
        let toml = r#"
[question_set]
domain = "History"

[[questions]]
question = "Q?"
answer = "A"

[questions.choices]
A = "one"
Z = "two"
"#;
        let err = parse_question_set_str(toml, &PathBuf::from("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("unknown label"));
    }

    #[test]
    fn validate_flags_problems() {
        let toml = r#"
[question_set]
domain = "Social_Science"

[[questions]]
id = "same"
question = "Q1?"
answer = "D"

[questions.choices]
A = "one"
B = "two"

[[questions]]
id = "same"
question = "Q2?"
answer = "Somewhere else"

[questions.choices]
A = "only"
"#;
        let set = parse_question_set_str(toml, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_question_set(&set);
        assert!(warnings.iter().any(|w| w.message.contains("duplicate")));
        assert!(warnings.iter().any(|w| w.message.contains("not one of the choices")));
        assert!(warnings.iter().any(|w| w.message.contains("at least 2 choices")));
        assert!(warnings.iter().any(|w| w.message.contains("neither a label")));
    }

    #[test]
    fn legacy_text_answer_is_accepted() {
        let toml = r#"
[question_set]
domain = "History"

[[questions]]
question = "Which came first?"
answer = "Stone Age"

[questions.choices]
A = "Bronze Age"
B = "Stone Age"
"#;
        let set = parse_question_set_str(toml, &PathBuf::from("legacy.toml")).unwrap();
        assert_eq!(
            set.questions[0].expected_answer,
            ExpectedAnswer::Text("Stone Age".into())
        );
        assert!(validate_question_set(&set).is_empty());
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        let result = parse_question_set_str(bad, &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("history.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not toml [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let sets = load_question_directory(dir.path()).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].name, "Prehistory");

        let single = load_question_sets(&dir.path().join("history.toml")).unwrap();
        assert_eq!(single[0].questions.len(), 2);
    }
}
