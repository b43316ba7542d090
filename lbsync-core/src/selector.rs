use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    str::FromStr,
};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static KEY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9]([-A-Za-z0-9.]*[A-Za-z0-9])?/)?[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$")
        .unwrap()
});
static VALUE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?)?$").unwrap());
static SET_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<key>\S+)\s+(?P<op>in|notin)\s*\((?P<values>[^()]*)\)$").unwrap()
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("Invalid label selector term '{}'!", .0)]
    InvalidTerm(String),
    #[error("Invalid label key '{}'!", .0)]
    InvalidKey(String),
    #[error("Invalid label value '{}'!", .0)]
    InvalidValue(String),
    #[error("Unbalanced parentheses in label selector!")]
    UnbalancedParentheses,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Exists(String),
    DoesNotExist(String),
}

/// Kubernetes label selector expression, e.g. `role=bgp,zone in (a,b),!spot`.
///
/// An empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector(Vec<Requirement>);

impl LabelSelector {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.0
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|requirement| requirement.matches(labels))
    }
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(key, value) => labels.get(key) == Some(value),
            Requirement::NotEquals(key, value) => labels.get(key) != Some(value),
            Requirement::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::NotIn(key, values) => !labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::Exists(key) => labels.contains_key(key),
            Requirement::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Requirement::Equals(key, value) => write!(f, "{key}={value}"),
            Requirement::NotEquals(key, value) => write!(f, "{key}!={value}"),
            Requirement::In(key, values) => write!(f, "{key} in ({})", values.join(",")),
            Requirement::NotIn(key, values) => write!(f, "{key} notin ({})", values.join(",")),
            Requirement::Exists(key) => write!(f, "{key}"),
            Requirement::DoesNotExist(key) => write!(f, "!{key}"),
        }
    }
}

impl Display for LabelSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let terms = self.0.iter().map(ToString::to_string).collect::<Vec<_>>();

        write!(f, "{}", terms.join(","))
    }
}

impl FromStr for LabelSelector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        split_terms(s)?
            .into_iter()
            .map(parse_term)
            .collect::<Result<Vec<_>, _>>()
            .map(LabelSelector)
    }
}

// commas inside `in (...)` sets don't separate terms
fn split_terms(raw: &str) -> Result<Vec<&str>, SelectorError> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (index, character) in raw.char_indices() {
        match character {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or(SelectorError::UnbalancedParentheses)?,
            ',' if depth == 0 => {
                terms.push(&raw[start..index]);
                start = index + 1;
            }
            _ => (),
        }
    }

    if depth != 0 {
        return Err(SelectorError::UnbalancedParentheses);
    }

    terms.push(&raw[start..]);

    let terms = terms.into_iter().map(str::trim).collect::<Vec<_>>();

    if terms.len() == 1 && terms[0].is_empty() {
        return Ok(Vec::new());
    }

    Ok(terms)
}

fn parse_term(term: &str) -> Result<Requirement, SelectorError> {
    if term.is_empty() {
        return Err(SelectorError::InvalidTerm(term.to_owned()));
    }

    if let Some(captures) = SET_REGEX.captures(term) {
        let key = parse_key(&captures["key"])?;
        let values = captures["values"]
            .split(',')
            .map(|value| parse_value(value.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        return Ok(match &captures["op"] {
            "in" => Requirement::In(key, values),
            _ => Requirement::NotIn(key, values),
        });
    }

    if let Some((key, value)) = term.split_once("!=") {
        return Ok(Requirement::NotEquals(parse_key(key.trim())?, parse_value(value.trim())?));
    }

    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Ok(Requirement::Equals(parse_key(key.trim())?, parse_value(value.trim())?));
    }

    if let Some(key) = term.strip_prefix('!') {
        return Ok(Requirement::DoesNotExist(parse_key(key.trim())?));
    }

    Ok(Requirement::Exists(parse_key(term)?))
}

fn parse_key(key: &str) -> Result<String, SelectorError> {
    match KEY_REGEX.is_match(key) {
        true => Ok(key.to_owned()),
        false => Err(SelectorError::InvalidKey(key.to_owned())),
    }
}

fn parse_value(value: &str) -> Result<String, SelectorError> {
    match VALUE_REGEX.is_match(value) {
        true => Ok(value.to_owned()),
        false => Err(SelectorError::InvalidValue(value.to_owned())),
    }
}
