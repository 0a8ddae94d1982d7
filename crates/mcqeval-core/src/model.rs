//! Core data model types for mcqeval.
//!
//! These are the types shared by the question store, the run controller and
//! the analysis reader: domains, choice labels, questions and their
//! evaluation records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A fixed subject area. Each domain is stored as its own collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Domain {
    #[serde(rename = "Computer_Security")]
    ComputerSecurity,
    #[serde(rename = "History")]
    History,
    #[serde(rename = "Social_Science")]
    SocialScience,
}

impl Domain {
    /// Every known domain, in run order.
    pub const ALL: [Domain; 3] = [Domain::ComputerSecurity, Domain::History, Domain::SocialScience];

    /// Collection name used by stores.
    pub fn collection(&self) -> &'static str {
        match self {
            Domain::ComputerSecurity => "Computer_Security",
            Domain::History => "History",
            Domain::SocialScience => "Social_Science",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "computersecurity" => Ok(Domain::ComputerSecurity),
            "history" => Ok(Domain::History),
            "socialscience" => Ok(Domain::SocialScience),
            _ => Err(format!("unknown domain: {s}")),
        }
    }
}

/// A single-character choice identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    A,
    B,
    C,
    D,
}

impl Label {
    /// The full label alphabet, in display order.
    pub const ALL: [Label; 4] = [Label::A, Label::B, Label::C, Label::D];

    pub fn as_char(&self) -> char {
        match self {
            Label::A => 'A',
            Label::B => 'B',
            Label::C => 'C',
            Label::D => 'D',
        }
    }

    /// Case-insensitive conversion from a single character.
    pub fn from_char(c: char) -> Option<Label> {
        match c.to_ascii_uppercase() {
            'A' => Some(Label::A),
            'B' => Some(Label::B),
            'C' => Some(Label::C),
            'D' => Some(Label::D),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Label::from_char(c).ok_or_else(|| format!("unknown label: {s}")),
            _ => Err(format!("unknown label: {s}")),
        }
    }
}

// Labels are plain strings on the wire so they also work as map keys.
impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The answer a question expects.
///
/// Older question sets stored the text of the correct choice instead of
/// its label; both forms are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedAnswer {
    Label(Label),
    Text(String),
}

impl ExpectedAnswer {
    /// Whether a normalized answer counts as correct for this question.
    pub fn matches(&self, choices: &BTreeMap<Label, String>, answer: Option<Label>) -> bool {
        let Some(answer) = answer else {
            return false;
        };
        match self {
            ExpectedAnswer::Label(expected) => *expected == answer,
            ExpectedAnswer::Text(text) => {
                let text = text.trim();
                text.eq_ignore_ascii_case(&answer.to_string())
                    || choices
                        .get(&answer)
                        .is_some_and(|choice| choice.trim().eq_ignore_ascii_case(text))
            }
        }
    }
}

impl fmt::Display for ExpectedAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedAnswer::Label(label) => write!(f, "{label}"),
            ExpectedAnswer::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for ExpectedAnswer {
    fn from(s: &str) -> Self {
        match s.parse::<Label>() {
            Ok(label) => ExpectedAnswer::Label(label),
            Err(_) => ExpectedAnswer::Text(s.trim().to_string()),
        }
    }
}

impl Serialize for ExpectedAnswer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ExpectedAnswer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ExpectedAnswer::from(s.as_str()))
    }
}

/// The latest evaluation of a question. Overwritten on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Label extracted from the reply, if any.
    pub normalized_answer: Option<Label>,
    /// The reply as received, or the error sentinel.
    pub raw_text: String,
    /// Round-trip time of the answer-service call in milliseconds.
    pub latency_ms: u64,
    /// When the evaluation was recorded.
    pub evaluated_at: DateTime<Utc>,
}

/// A stored multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Opaque identifier, unique within the store.
    pub id: String,
    pub domain: Domain,
    /// The question text.
    pub question: String,
    /// Choice texts keyed by label.
    #[serde(default)]
    pub choices: BTreeMap<Label, String>,
    pub expected_answer: ExpectedAnswer,
    /// Absent until the question has been evaluated once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
}

impl Question {
    /// Returns the name of the first required field that is missing, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.id.trim().is_empty() {
            Some("id")
        } else if self.question.trim().is_empty() {
            Some("question")
        } else if self.choices.is_empty() {
            Some("choices")
        } else {
            None
        }
    }

    /// Whether the latest evaluation answered correctly.
    pub fn is_correct(&self) -> bool {
        self.evaluation.as_ref().is_some_and(|e| {
            self.expected_answer
                .matches(&self.choices, e.normalized_answer)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_question() -> Question {
        Question {
            id: "q-1".into(),
            domain: Domain::History,
            question: "Which came first?".into(),
            choices: BTreeMap::from([
                (Label::A, "Bronze Age".to_string()),
                (Label::B, "Stone Age".to_string()),
            ]),
            expected_answer: ExpectedAnswer::Label(Label::B),
            evaluation: None,
        }
    }

    #[test]
    fn domain_display_and_parse() {
        assert_eq!(Domain::ComputerSecurity.to_string(), "Computer_Security");
        assert_eq!("history".parse::<Domain>().unwrap(), Domain::History);
        assert_eq!(
            "social-science".parse::<Domain>().unwrap(),
            Domain::SocialScience
        );
        assert_eq!(
            "Computer Security".parse::<Domain>().unwrap(),
            Domain::ComputerSecurity
        );
        assert!("chemistry".parse::<Domain>().is_err());
    }

    #[test]
    fn label_parse_is_case_insensitive() {
        assert_eq!("b".parse::<Label>().unwrap(), Label::B);
        assert_eq!(" D ".parse::<Label>().unwrap(), Label::D);
        assert!("E".parse::<Label>().is_err());
        assert!("AB".parse::<Label>().is_err());
    }

    #[test]
    fn expected_answer_forms() {
        assert_eq!(ExpectedAnswer::from("c"), ExpectedAnswer::Label(Label::C));
        assert_eq!(
            ExpectedAnswer::from("Stone Age"),
            ExpectedAnswer::Text("Stone Age".into())
        );
    }

    #[test]
    fn legacy_text_answer_matches_choice_text() {
        let mut q = sample_question();
        q.expected_answer = ExpectedAnswer::Text("stone age".into());
        assert!(q.expected_answer.matches(&q.choices, Some(Label::B)));
        assert!(!q.expected_answer.matches(&q.choices, Some(Label::A)));
        assert!(!q.expected_answer.matches(&q.choices, None));
    }

    #[test]
    fn question_json_shape() {
        let q = sample_question();
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["domain"], "History");
        assert_eq!(json["choices"]["B"], "Stone Age");
        assert_eq!(json["expected_answer"], "B");
        assert!(json.get("evaluation").is_none());

        let back: Question = serde_json::from_value(json).unwrap();
        assert_eq!(back.choices.len(), 2);
        assert_eq!(back.expected_answer, ExpectedAnswer::Label(Label::B));
    }

    #[test]
    fn missing_fields_are_reported() {
        let mut q = sample_question();
        assert_eq!(q.missing_field(), None);
        q.choices.clear();
        assert_eq!(q.missing_field(), Some("choices"));
        q.question = "  ".into();
        assert_eq!(q.missing_field(), Some("question"));
    }
}
