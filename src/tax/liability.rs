use crate::core::model::SEPARATOR;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Regime {
    IncomeTax,
    NationalInsurance,
    CapitalGains,
}

impl Regime {
    fn parse(s: &str) -> Option<Regime> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incometax" => Some(Regime::IncomeTax),
            "ni" => Some(Regime::NationalInsurance),
            "cgt" => Some(Regime::CapitalGains),
            _ => None,
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Regime::IncomeTax => "incomeTax",
            Regime::NationalInsurance => "NI",
            Regime::CapitalGains => "CGT",
        };
        write!(f, "{s}")
    }
}

/// A single `Person(regime)` clause of a liability tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Liability {
    pub person: String,
    pub regime: Regime,
}

/// Parse a tag such as `Joe(incomeTax)/Joe(NI)`. Clauses that do not name a
/// person and a known regime are skipped.
pub fn parse_liabilities(tag: &str) -> Vec<Liability> {
    tag.split(SEPARATOR)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let parsed = parse_clause(part);
            if parsed.is_none() {
                log::warn!("Ignoring malformed liability '{}'", part);
            }
            parsed
        })
        .collect()
}

fn parse_clause(part: &str) -> Option<Liability> {
    let (person, rest) = part.split_once('(')?;
    let regime = rest.strip_suffix(')')?;
    let person = person.trim();
    if person.is_empty() {
        return None;
    }
    Some(Liability {
        person: person.to_string(),
        regime: Regime::parse(regime)?,
    })
}

/// Persons named with `regime` in `tag`, deduplicated, in tag order.
pub fn persons_for(tag: &str, regime: Regime) -> Vec<String> {
    let mut persons: Vec<String> = Vec::new();
    for liability in parse_liabilities(tag) {
        if liability.regime == regime && !persons.contains(&liability.person) {
            persons.push(liability.person);
        }
    }
    persons
}
