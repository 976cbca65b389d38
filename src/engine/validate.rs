//! Input validation helpers for the conversation engine.
//!
//! Validation is uniform by design: a helper either produces a parsed
//! value or nothing, and the engine re-prompts without touching state on
//! nothing. No helper here ever raises an error.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::SYMPTOMS;

/// A parsed YES/NO answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YesNo {
    Yes,
    No,
}

/// Parse YES/Y or NO/N, case-insensitive.
pub fn parse_yes_no(text: &str) -> Option<YesNo> {
    match text.trim().to_uppercase().as_str() {
        "YES" | "Y" => Some(YesNo::Yes),
        "NO" | "N" => Some(YesNo::No),
        _ => None,
    }
}

/// Parse any text representable as a real number. Range checks are the
/// caller's job.
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn zip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("zip regex is valid"))
}

/// Parse a US zip code (5 digits, optional +4). Interior whitespace is
/// stripped first. Returns the 5-digit prefix.
pub fn parse_zip(text: &str) -> Option<String> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if zip_regex().is_match(&compact) {
        Some(compact[..5].to_string())
    } else {
        None
    }
}

/// Parse symptom letters A-E from free text, case-insensitive, duplicates
/// collapsed. Produces the canonical stored form: symptom names sorted and
/// comma-joined. Returns `None` when no recognized letter is present.
pub fn parse_symptoms(text: &str) -> Option<String> {
    let mut names: Vec<&str> = text
        .to_uppercase()
        .chars()
        .filter_map(|c| SYMPTOMS.iter().find(|(l, _)| *l == c).map(|(_, n)| *n))
        .collect();
    if names.is_empty() {
        return None;
    }
    names.sort_unstable();
    names.dedup();
    Some(names.join(","))
}
