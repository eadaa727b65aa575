use std::{
    cmp::Ordering,
    fmt::{self, Display},
};

use serde::{Deserialize, Serialize};

use crate::model::ParseError;

pub const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    Fixed,
    Dynamic,
    Snapshot,
}

/// A module version as declared or resolved.
///
/// The derived ordering is lexical and only meant for stable storage;
/// use a [`VersionComparator`] to find out which version is newer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    pub fn new(value: impl Into<String>) -> Result<Self, ParseError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ParseError::Blank("version"));
        }
        Ok(Version(value.trim().to_string()))
    }

    pub(crate) fn from_trusted(value: String) -> Self {
        Version(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> VersionKind {
        if self.is_dynamic() {
            VersionKind::Dynamic
        } else if self.is_snapshot() {
            VersionKind::Snapshot
        } else {
            VersionKind::Fixed
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.0.ends_with(SNAPSHOT_SUFFIX)
    }

    pub fn is_dynamic(&self) -> bool {
        let value = self.0.as_str();
        value.starts_with("latest.")
            || value.ends_with('+')
            || (value.len() >= 2
                && value.starts_with(&['[', ']', '('][..])
                && value.ends_with(&['[', ']', ')'][..]))
    }

    /// The version with the `-SNAPSHOT` suffix removed.
    pub fn base(&self) -> &str {
        self.0.strip_suffix(SNAPSHOT_SUFFIX).unwrap_or(&self.0)
    }

    /// Whether `candidate` satisfies this version seen as a constraint.
    /// Non-dynamic versions only accept themselves.
    pub fn accepts(
        &self,
        candidate: &Version,
        comparator: VersionComparator,
    ) -> Result<bool, ParseError> {
        if !self.is_dynamic() {
            return Ok(self == candidate);
        }
        let accepted = match self.constraint()? {
            Constraint::Latest { release_only } => !release_only || !candidate.is_snapshot(),
            Constraint::Prefix(prefix) => candidate.0.starts_with(prefix),
            Constraint::Range { lower, upper } => {
                let snapshot_bound = [&lower, &upper]
                    .into_iter()
                    .flatten()
                    .any(|bound| bound.version.ends_with(SNAPSHOT_SUFFIX));
                if candidate.is_snapshot() && !snapshot_bound {
                    false
                } else {
                    let above = lower.map_or(true, |bound| {
                        match comparator.compare_str(&candidate.0, bound.version) {
                            Ordering::Greater => true,
                            Ordering::Equal => bound.inclusive,
                            Ordering::Less => false,
                        }
                    });
                    let below = upper.map_or(true, |bound| {
                        match comparator.compare_str(&candidate.0, bound.version) {
                            Ordering::Less => true,
                            Ordering::Equal => bound.inclusive,
                            Ordering::Greater => false,
                        }
                    });
                    above && below
                }
            }
        };
        Ok(accepted)
    }

    fn constraint(&self) -> Result<Constraint<'_>, ParseError> {
        let value = self.0.as_str();
        if let Some(kind) = value.strip_prefix("latest.") {
            return Ok(Constraint::Latest {
                release_only: kind == "release",
            });
        }
        if let Some(prefix) = value.strip_suffix('+') {
            return Ok(Constraint::Prefix(prefix));
        }
        let invalid = || ParseError::InvalidVersionRange(value.to_string());
        let first = value.chars().next().ok_or_else(invalid)?;
        let last = value.chars().last().ok_or_else(invalid)?;
        let inner = value.get(1..value.len() - 1).ok_or_else(invalid)?;
        match inner.split_once(',') {
            Some((lower, upper)) => {
                let lower = lower.trim();
                let upper = upper.trim();
                Ok(Constraint::Range {
                    lower: (!lower.is_empty()).then_some(Bound {
                        version: lower,
                        inclusive: first == '[',
                    }),
                    upper: (!upper.is_empty()).then_some(Bound {
                        version: upper,
                        inclusive: last == ']',
                    }),
                })
            }
            None if first == '[' && last == ']' && !inner.trim().is_empty() => {
                let exact = Bound {
                    version: inner.trim(),
                    inclusive: true,
                };
                Ok(Constraint::Range {
                    lower: Some(exact),
                    upper: Some(exact),
                })
            }
            None => Err(invalid()),
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Version {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Version::new(value)
    }
}

impl TryFrom<&str> for Version {
    type Error = ParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Version::new(value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.0
    }
}

enum Constraint<'a> {
    Latest {
        release_only: bool,
    },
    Prefix(&'a str),
    Range {
        lower: Option<Bound<'a>>,
        upper: Option<Bound<'a>>,
    },
}

#[derive(Clone, Copy)]
struct Bound<'a> {
    version: &'a str,
    inclusive: bool,
}

/// Decides which of two versions is the newer one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionComparator {
    /// Numeric segments compare as numbers, qualifiers follow the usual
    /// alpha < beta < milestone < rc < snapshot < release < sp order.
    #[default]
    DottedNumeric,
    /// Plain string comparison.
    Lexical,
}

impl VersionComparator {
    pub fn compare(&self, left: &Version, right: &Version) -> Ordering {
        self.compare_str(&left.0, &right.0)
    }

    pub fn max<'a>(&self, versions: impl IntoIterator<Item = &'a Version>) -> Option<&'a Version> {
        versions
            .into_iter()
            .max_by(|left, right| self.compare(left, right))
    }

    pub fn sort(&self, versions: &mut [Version]) {
        versions.sort_by(|left, right| self.compare(left, right));
    }

    fn compare_str(&self, left: &str, right: &str) -> Ordering {
        match self {
            VersionComparator::Lexical => left.cmp(right),
            VersionComparator::DottedNumeric => {
                compare_tokens(&tokenize(left), &tokenize(right)).then_with(|| left.cmp(right))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Number(&'a str),
    Qualifier(String),
}

fn tokenize(value: &str) -> Vec<Token<'_>> {
    fn token(part: &str, digits: bool) -> Token<'_> {
        if digits {
            Token::Number(part.trim_start_matches('0'))
        } else {
            Token::Qualifier(part.to_ascii_lowercase())
        }
    }

    let mut tokens = Vec::new();
    let mut current: Option<(usize, bool)> = None;
    for (index, c) in value.char_indices() {
        if matches!(c, '.' | '-' | '_') {
            if let Some((start, digits)) = current.take() {
                tokens.push(token(&value[start..index], digits));
            }
            continue;
        }
        let digit = c.is_ascii_digit();
        match current {
            Some((start, digits)) if digits != digit => {
                tokens.push(token(&value[start..index], digits));
                current = Some((index, digit));
            }
            Some(_) => {}
            None => current = Some((index, digit)),
        }
    }
    if let Some((start, digits)) = current {
        tokens.push(token(&value[start..], digits));
    }
    tokens
}

fn qualifier_rank(qualifier: &str) -> u8 {
    match qualifier {
        "alpha" | "a" => 0,
        "beta" | "b" => 1,
        "milestone" | "m" => 2,
        "rc" | "cr" => 3,
        "snapshot" => 4,
        "" | "ga" | "final" | "release" => 5,
        "sp" => 6,
        _ => 7,
    }
}

fn compare_token(left: &Token, right: &Token) -> Ordering {
    match (left, right) {
        (Token::Number(l), Token::Number(r)) => l.len().cmp(&r.len()).then_with(|| l.cmp(r)),
        (Token::Qualifier(l), Token::Qualifier(r)) => qualifier_rank(l)
            .cmp(&qualifier_rank(r))
            .then_with(|| l.cmp(r)),
        (Token::Number(_), Token::Qualifier(_)) => Ordering::Greater,
        (Token::Qualifier(_), Token::Number(_)) => Ordering::Less,
    }
}

fn compare_tokens(left: &[Token], right: &[Token]) -> Ordering {
    let padding = |other: &Token| match other {
        Token::Number(_) => Token::Number(""),
        Token::Qualifier(_) => Token::Qualifier(String::new()),
    };
    for index in 0..left.len().max(right.len()) {
        let ordering = match (left.get(index), right.get(index)) {
            (Some(l), Some(r)) => compare_token(l, r),
            (Some(l), None) => compare_token(l, &padding(l)),
            (None, Some(r)) => compare_token(&padding(r), r),
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
