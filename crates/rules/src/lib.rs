//! Rule-based classification overrides.
//!
//! A fixed, ordered list of keyword rules is matched once against every
//! business. The resulting `RuleTable` is consulted before any weighted
//! score: a business matching several rules gets the code of the earliest
//! declared one.

use naicsflow_model::Business;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    #[error("Rule name is empty")]
    EmptyName,
    #[error("Rule '{0}' has no patterns")]
    NoPatterns(String),
    #[error("Rule '{0}' has an empty pattern")]
    EmptyPattern(String),
    #[error("Rule '{0}' searches no fields")]
    NoFields(String),
    #[error("Rule '{0}' has an empty code")]
    EmptyCode(String),
}

/// Business field a rule searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    BusinessType,
    Description,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Char(char),
    /// `_`
    One,
    /// `%`
    Many,
}

/// A case-insensitive SQL `LIKE` pattern with implicit leading and trailing `%`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikePattern {
    source: String,
    tokens: Vec<Token>,
}

impl LikePattern {
    pub fn new(source: &str) -> Self {
        let mut tokens = vec![Token::Many];
        for c in source.chars() {
            match c {
                '%' => {
                    if tokens.last() != Some(&Token::Many) {
                        tokens.push(Token::Many);
                    }
                }
                '_' => tokens.push(Token::One),
                c => tokens.extend(c.to_lowercase().map(Token::Char)),
            }
        }
        if tokens.last() != Some(&Token::Many) {
            tokens.push(Token::Many);
        }
        Self {
            source: source.to_string(),
            tokens,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.to_lowercase().chars().collect();
        let pattern = &self.tokens;
        let (mut t, mut p) = (0, 0);
        // Last `%` seen and the text position it is currently absorbing up to.
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            match pattern.get(p) {
                Some(Token::Char(c)) if *c == text[t] => {
                    p += 1;
                    t += 1;
                    continue;
                }
                Some(Token::One) => {
                    p += 1;
                    t += 1;
                    continue;
                }
                Some(Token::Many) => {
                    backtrack = Some((p, t));
                    p += 1;
                    continue;
                }
                _ => {}
            }

            match backtrack {
                Some((star, absorbed)) => {
                    p = star + 1;
                    t = absorbed + 1;
                    backtrack = Some((star, absorbed + 1));
                }
                None => return false,
            }
        }

        pattern[p..].iter().all(|token| *token == Token::Many)
    }
}

/// One override rule: any pattern found in any field assigns `code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleSpec", into = "RuleSpec")]
pub struct Rule {
    name: String,
    patterns: Vec<LikePattern>,
    fields: Vec<Field>,
    code: String,
}

/// Serialized form of a `Rule`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub patterns: Vec<String>,
    pub fields: Vec<Field>,
    pub code: String,
}

impl TryFrom<RuleSpec> for Rule {
    type Error = RuleError;

    fn try_from(spec: RuleSpec) -> Result<Self, Self::Error> {
        let patterns: Vec<&str> = spec.patterns.iter().map(String::as_str).collect();
        Rule::new(spec.name, &patterns, &spec.fields, spec.code)
    }
}

impl From<Rule> for RuleSpec {
    fn from(rule: Rule) -> Self {
        Self {
            patterns: rule.patterns.iter().map(|p| p.as_str().to_string()).collect(),
            name: rule.name,
            fields: rule.fields,
            code: rule.code,
        }
    }
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        patterns: &[&str],
        fields: &[Field],
        code: impl Into<String>,
    ) -> Result<Self, RuleError> {
        let name = name.into();
        let code = code.into();
        if name.trim().is_empty() {
            return Err(RuleError::EmptyName);
        }
        if patterns.is_empty() {
            return Err(RuleError::NoPatterns(name));
        }
        if patterns.iter().any(|p| p.trim_matches('%').is_empty()) {
            return Err(RuleError::EmptyPattern(name));
        }
        if fields.is_empty() {
            return Err(RuleError::NoFields(name));
        }
        if code.trim().is_empty() {
            return Err(RuleError::EmptyCode(name));
        }
        Ok(Self {
            name,
            patterns: patterns.iter().map(|p| LikePattern::new(p)).collect(),
            fields: fields.to_vec(),
            code,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Whether any pattern appears in any searched field.
    pub fn matches(&self, business: &Business, business_type: Option<&str>) -> bool {
        self.fields.iter().any(|field| {
            let text = match field {
                Field::Name => Some(business.name.as_str()),
                Field::BusinessType => business_type,
                Field::Description => Some(business.description.as_str()),
            };
            text.is_some_and(|text| self.patterns.iter().any(|p| p.matches(text)))
        })
    }
}

/// The override rules in priority order.
pub fn default_rules() -> Vec<Rule> {
    use Field::{BusinessType, Description, Name};

    let declarations: [(&str, &[&str], &[Field], &str); 11] = [
        ("redbox", &["redbox"], &[Name], "532230"),
        ("restaurant", &["restaurant"], &[Name, BusinessType, Description], "72251"),
        ("veterinary", &["veterinary"], &[Name, BusinessType, Description], "541940"),
        ("insurance", &["insurance"], &[Name, BusinessType], "524210"),
        ("dentist", &["dentist", "dental"], &[Name, BusinessType, Description], "621210"),
        ("bank", &["bank"], &[BusinessType], "52"),
        ("car repair", &["car%repair"], &[Name, BusinessType], "811111"),
        ("landscaping", &["landscap"], &[Name, BusinessType], "561730"),
        ("locksmith", &["locksmith"], &[Name, BusinessType], "561622"),
        ("hotel", &["hotel", "motel"], &[Name, BusinessType], "721110"),
        ("photo", &["photo"], &[Name, BusinessType], "541921"),
    ];

    declarations
        .into_iter()
        .map(|(name, patterns, fields, code)| Rule {
            name: name.to_string(),
            patterns: patterns.iter().map(|p| LikePattern::new(p)).collect(),
            fields: fields.to_vec(),
            code: code.to_string(),
        })
        .collect()
}

/// Rule membership computed once for a fixed set of businesses. Read-only.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
    /// Business ids matching each rule, aligned with `rules`.
    members: Vec<BTreeSet<String>>,
    /// Index of the first matching rule per business.
    assigned: HashMap<String, usize>,
}

impl RuleTable {
    /// Match every business against every rule.
    ///
    /// `hints` are external business-type labels keyed by business id; they
    /// take precedence over `Business::business_type`.
    pub fn build(rules: Vec<Rule>, businesses: &[Business], hints: &HashMap<String, String>) -> Self {
        let mut members = vec![BTreeSet::new(); rules.len()];
        let mut assigned = HashMap::new();

        for business in businesses {
            let business_type = business.category_hint(hints);
            for (index, rule) in rules.iter().enumerate() {
                if rule.matches(business, business_type) {
                    members[index].insert(business.id.clone());
                    assigned.entry(business.id.clone()).or_insert(index);
                }
            }
        }

        for (rule, ids) in rules.iter().zip(&members) {
            debug!(rule = rule.name(), code = rule.code(), matched = ids.len(), "Rule matched");
        }
        info!(
            rules = rules.len(),
            businesses = businesses.len(),
            overridden = assigned.len(),
            "Built rule table"
        );

        Self {
            rules,
            members,
            assigned,
        }
    }

    /// A table that never overrides.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            members: Vec::new(),
            assigned: HashMap::new(),
        }
    }

    /// Code of the earliest declared rule matching this business.
    pub fn lookup(&self, business_id: &str) -> Option<&str> {
        self.matched_rule(business_id).map(Rule::code)
    }

    pub fn matched_rule(&self, business_id: &str) -> Option<&Rule> {
        self.assigned.get(business_id).map(|&index| &self.rules[index])
    }

    /// Business ids matched by rules producing `code`, regardless of precedence.
    pub fn members(&self, code: &str) -> BTreeSet<&str> {
        self.rules
            .iter()
            .zip(&self.members)
            .filter(|(rule, _)| rule.code() == code)
            .flat_map(|(_, ids)| ids.iter().map(String::as_str))
            .collect()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of businesses with an override.
    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}
