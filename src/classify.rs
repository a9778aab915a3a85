//! Heuristic shipping-label field classification.
//!
//! Pure functions, no I/O. Lines are tested against an ordered rule list
//! with first-match-wins semantics per field: a field set from an earlier
//! line is never overwritten, and a line claims at most one field — the
//! first rule it satisfies. Ambiguous text (a 10-digit run that could be a
//! tracking fragment or a phone number) resolves in favor of whichever
//! pattern runs first; that imprecision is inherent to the heuristic.

use regex::{Regex, RegexBuilder};

/// Courier names recognized by the company rule (substring match).
const COURIER_KEYWORDS: [&str; 8] = [
    "flipkart",
    "ekart",
    "delhivery",
    "amazon",
    "bluedart",
    "xpressbees",
    "ecom",
    "shadowfax",
];

/// Typed field mapping produced by classification. Fields never found stay
/// empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    pub name: String,
    pub company: String,
    pub phone: String,
    pub awb: String,
    pub roll_no: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Awb,
    Phone,
    RollNo,
    Company,
    Name,
}

enum Matcher {
    /// Value is the first capture group (or whole match) found in the line.
    Capture(Regex),
    /// Value is the whole line when any keyword occurs in it.
    Keyword(&'static [&'static str]),
    /// Value is the whole line when it matches end to end.
    Line(Regex),
}

impl Matcher {
    fn value_in(&self, line: &str) -> Option<String> {
        match self {
            Matcher::Capture(regex) => regex.captures(line).map(|caps| {
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            }),
            Matcher::Keyword(words) => {
                let lower = line.to_lowercase();
                words
                    .iter()
                    .any(|w| lower.contains(w))
                    .then(|| line.to_string())
            }
            Matcher::Line(regex) => regex.is_match(line).then(|| line.trim().to_string()),
        }
    }
}

struct Rule {
    field: Field,
    matcher: Matcher,
}

/// Compiled rule list, built once at startup. The rule order is the fixed
/// per-line priority: AWB, phone, roll number, company, name.
pub struct Classifier {
    rules: Vec<Rule>,
    strip: Regex,
}

impl Classifier {
    pub fn new() -> Self {
        let rules = vec![
            Rule {
                field: Field::Awb,
                matcher: Matcher::Capture(Regex::new(r"\b\d{10,15}\b").unwrap()),
            },
            Rule {
                field: Field::Phone,
                matcher: Matcher::Capture(Regex::new(r"(?:\+?91|0)?\s?(\d{10})\b").unwrap()),
            },
            Rule {
                field: Field::RollNo,
                matcher: Matcher::Capture(
                    RegexBuilder::new(r"\b\d{2}[A-Z0-9]{8}\b")
                        .case_insensitive(true)
                        .build()
                        .unwrap(),
                ),
            },
            Rule {
                field: Field::Company,
                matcher: Matcher::Keyword(&COURIER_KEYWORDS),
            },
            Rule {
                field: Field::Name,
                matcher: Matcher::Line(Regex::new(r"^[A-Za-z][A-Za-z\s.]{2,40}$").unwrap()),
            },
        ];
        Self {
            rules,
            strip: Regex::new(r"[^a-zA-Z0-9\s,+.-]").unwrap(),
        }
    }

    /// Classify OCR text lines into typed fields. Deterministic and total:
    /// any input yields a mapping, with misses as empty strings.
    pub fn classify(&self, lines: &[String]) -> FieldMap {
        let mut map = FieldMap::default();
        let cleaned = lines
            .iter()
            .filter(|line| line.trim().len() > 2)
            .map(|line| self.strip.replace_all(line, "").trim().to_string());

        for line in cleaned {
            for rule in &self.rules {
                if !map.get(rule.field).is_empty() {
                    continue;
                }
                if let Some(value) = rule.matcher.value_in(&line) {
                    map.set(rule.field, value);
                    break; // a line claims exactly one field
                }
            }
        }
        map
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldMap {
    fn get(&self, field: Field) -> &str {
        match field {
            Field::Awb => &self.awb,
            Field::Phone => &self.phone,
            Field::RollNo => &self.roll_no,
            Field::Company => &self.company,
            Field::Name => &self.name,
        }
    }

    fn set(&mut self, field: Field, value: String) {
        match field {
            Field::Awb => self.awb = value,
            Field::Phone => self.phone = value,
            Field::RollNo => self.roll_no = value,
            Field::Company => self.company = value,
            Field::Name => self.name = value,
        }
    }
}
