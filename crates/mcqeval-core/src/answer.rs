//! Prompt construction and reply normalization.

use crate::model::{Label, Question};

/// Raw-text marker stored when the answer service failed.
pub const ERROR_SENTINEL: &str = "[answer-service-error]";

/// Build the prompt sent to the answer service for one question.
pub fn build_prompt(question: &Question) -> String {
    let mut prompt = String::from("You are answering a multiple-choice question. Choices:\n\n");
    for (label, text) in &question.choices {
        prompt.push_str(&format!("{label}: {}\n", text.trim()));
    }
    prompt.push_str(&format!("\nQuestion: {}\n\n", question.question.trim()));

    let labels: Vec<String> = question.choices.keys().map(Label::to_string).collect();
    let options = match labels.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{}, or {last}", rest.join(", ")),
        Some((last, _)) => last.clone(),
        None => String::new(),
    };
    prompt.push_str("IMPORTANT:\n");
    prompt.push_str(&format!("- Only answer with ONE letter: {options}.\n"));
    prompt.push_str("- No explanation.\n");
    prompt
}

/// Raw text recorded for a failed answer-service call.
pub fn error_raw_text(err: &anyhow::Error) -> String {
    format!("{ERROR_SENTINEL} {err}")
}

/// Extract a choice label from a free-text reply.
///
/// The reply is split into alphanumeric tokens. The first token that is a
/// single label character (any case) wins. Failing that, the first token
/// made of distinct upper-case label characters (e.g. `BD`) yields its
/// first character. Otherwise there is no answer.
///
/// Only the first candidate is taken: a reply naming several labels is not
/// disambiguated.
pub fn normalize_answer(reply: &str) -> Option<Label> {
    let tokens = || {
        reply
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
    };

    let single = tokens().find_map(|token| {
        let mut chars = token.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Label::from_char(c),
            _ => None,
        }
    });
    if single.is_some() {
        return single;
    }

    tokens()
        .find(|token| is_label_run(token))
        .and_then(|token| token.chars().next())
        .and_then(Label::from_char)
}

/// A short run of distinct upper-case labels, such as `BD`. Words spelled
/// from label letters (`BAD`, `DAD`) do not qualify.
fn is_label_run(token: &str) -> bool {
    let mut seen = Vec::with_capacity(Label::ALL.len());
    for c in token.chars() {
        if !c.is_ascii_uppercase() || Label::from_char(c).is_none() || seen.contains(&c) {
            return false;
        }
        seen.push(c);
    }
    !seen.is_empty() && seen.len() <= Label::ALL.len()
}

/// Normalized answer as the string stored and broadcast ("" when absent).
pub fn answer_token(answer: Option<Label>) -> String {
    answer.map(|l| l.to_string()).unwrap_or_default()
}
