//! Decoding of amount and growth strings.
//!
//! Model values arrive as free-form strings ("1,000", "£50", "25%",
//! "10 units", "2stockPrice"). They are decoded once into a [`ParsedValue`]
//! and resolved against the current setting values whenever an event needs
//! a number.

use super::error::EngineError;
use super::model::CPI_SETTING;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Maximum chain length when one setting is defined in terms of another.
pub const MAX_SETTING_DEPTH: usize = 10;

/// How a literal was written, so it can be re-encoded the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayTag {
    Plain,
    /// Written with a `£`
    Currency,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedValue {
    Literal { value: Decimal, tag: DisplayTag },
    /// Stored as a fraction: "50%" is 0.5.
    Percentage(Decimal),
    /// A whole number of units of a quantity-bearing asset.
    Units(Decimal),
    SettingRef { name: String, multiplier: Decimal },
}

impl ParsedValue {
    pub fn literal(value: Decimal) -> Self {
        ParsedValue::Literal {
            value,
            tag: DisplayTag::Plain,
        }
    }

    /// Resolve to a number. Percentages resolve to their fraction and units
    /// to their count; the caller decides what those mean.
    pub fn resolve<F>(&self, lookup: F) -> Result<Decimal, EngineError>
    where
        F: Fn(&str) -> Option<Decimal>,
    {
        match self {
            ParsedValue::Literal { value, .. } => Ok(*value),
            ParsedValue::Percentage(fraction) => Ok(*fraction),
            ParsedValue::Units(count) => Ok(*count),
            ParsedValue::SettingRef { name, multiplier } => lookup(name)
                .map(|v| v * multiplier)
                .ok_or_else(|| EngineError::malformed(self.to_string())),
        }
    }
}

impl fmt::Display for ParsedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedValue::Literal {
                value,
                tag: DisplayTag::Currency,
            } if value.is_sign_negative() => write!(f, "-£{}", value.abs().normalize()),
            ParsedValue::Literal {
                value,
                tag: DisplayTag::Currency,
            } => write!(f, "£{}", value.normalize()),
            ParsedValue::Literal { value, .. } => write!(f, "{}", value.normalize()),
            ParsedValue::Percentage(fraction) => {
                write!(f, "{}%", (fraction * dec!(100)).normalize())
            }
            ParsedValue::Units(count) => write!(f, "{} units", count.normalize()),
            ParsedValue::SettingRef { name, multiplier } if *multiplier == Decimal::ONE => {
                write!(f, "{name}")
            }
            ParsedValue::SettingRef { name, multiplier } => {
                write!(f, "{}{}", multiplier.normalize(), name)
            }
        }
    }
}

/// Decode an amount string.
pub fn parse_amount(raw: &str) -> Result<ParsedValue, EngineError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(EngineError::malformed(raw));
    }

    if let Some(number) = s.strip_suffix('%') {
        return parse_number(number)
            .map(|(n, _)| ParsedValue::Percentage(n / dec!(100)))
            .ok_or_else(|| EngineError::malformed(raw));
    }

    if let Some((n, _)) = strip_units_suffix(s).and_then(parse_number) {
        return if n.fract().is_zero() && !n.is_sign_negative() {
            Ok(ParsedValue::Units(n))
        } else {
            Err(EngineError::malformed(raw))
        };
    }

    if let Some((value, currency)) = parse_number(s) {
        let tag = if currency {
            DisplayTag::Currency
        } else {
            DisplayTag::Plain
        };
        return Ok(ParsedValue::Literal { value, tag });
    }

    parse_setting_ref(s).ok_or_else(|| EngineError::malformed(raw))
}

/// Decode a growth string. Bare numbers are percentages per annum.
pub fn parse_growth(raw: &str) -> Result<ParsedValue, EngineError> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(ParsedValue::Percentage(Decimal::ZERO));
    }
    match parse_amount(s)? {
        ParsedValue::Literal { value, .. } => Ok(ParsedValue::Percentage(value / dec!(100))),
        ParsedValue::Units(_) => Err(EngineError::malformed(raw)),
        other => Ok(other),
    }
}

/// Annual growth as a fraction. A setting referenced for growth holds a
/// percentage, like a bare growth number.
pub fn annual_rate<F>(growth: &ParsedValue, lookup: F) -> Result<Decimal, EngineError>
where
    F: Fn(&str) -> Option<Decimal>,
{
    match growth {
        ParsedValue::SettingRef { .. } => Ok(growth.resolve(lookup)? / dec!(100)),
        ParsedValue::Percentage(fraction) => Ok(*fraction),
        ParsedValue::Literal { value, .. } => Ok(value / dec!(100)),
        ParsedValue::Units(_) => Err(EngineError::malformed(growth.to_string())),
    }
}

/// Annual inflation as a fraction; the `cpi` setting holds a percentage.
pub fn cpi_rate(settings: &BTreeMap<String, Decimal>) -> Decimal {
    settings
        .get(CPI_SETTING)
        .map(|cpi| cpi / Decimal::ONE_HUNDRED)
        .unwrap_or_default()
}

/// Resolve every numeric setting, following setting-to-setting references up
/// to [`MAX_SETTING_DEPTH`]. Settings that are not numeric (dates, labels)
/// are left out of the result.
pub fn resolve_settings<'a, I>(settings: I) -> BTreeMap<String, Decimal>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let parsed: HashMap<&str, Result<ParsedValue, EngineError>> = settings
        .into_iter()
        .map(|(name, value)| (name, parse_amount(value)))
        .collect();

    let mut resolved = BTreeMap::new();
    for name in parsed.keys() {
        match resolve_setting(name, &parsed, 0) {
            Some(value) => {
                resolved.insert(name.to_string(), value);
            }
            None => log::debug!("setting '{}' is not numeric", name),
        }
    }
    resolved
}

fn resolve_setting(
    name: &str,
    parsed: &HashMap<&str, Result<ParsedValue, EngineError>>,
    depth: usize,
) -> Option<Decimal> {
    if depth > MAX_SETTING_DEPTH {
        return None;
    }
    match parsed.get(name)?.as_ref().ok()? {
        ParsedValue::Literal { value, .. } => Some(*value),
        ParsedValue::Percentage(fraction) => Some(*fraction),
        ParsedValue::Units(_) => None,
        ParsedValue::SettingRef {
            name: inner,
            multiplier,
        } => resolve_setting(inner, parsed, depth + 1).map(|v| v * multiplier),
    }
}

fn strip_units_suffix(s: &str) -> Option<&str> {
    let lower = s.to_ascii_lowercase();
    let cut = if lower.ends_with("units") {
        5
    } else if lower.ends_with("unit") {
        4
    } else {
        return None;
    };
    let count = s[..s.len() - cut].trim_end();
    if count.is_empty() {
        None
    } else {
        Some(count)
    }
}

/// Parse a plain or currency number. Returns whether a `£` was present.
fn parse_number(s: &str) -> Option<(Decimal, bool)> {
    let s = s.trim();
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (currency, rest) = match rest.strip_prefix('£') {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    // Allow "£-5" as well as "-£5".
    let (negative, rest) = match rest.strip_prefix('-') {
        Some(inner) if currency && !negative => (true, inner),
        _ => (negative, rest),
    };

    if rest.is_empty()
        || !rest.chars().any(|c| c.is_ascii_digit())
        || !rest
            .chars()
            .all(|c| c.is_ascii_digit() || c == ',' || c == '.')
    {
        return None;
    }
    if let Some(dot) = rest.find('.') {
        if rest[dot..].contains(',') {
            return None;
        }
    }

    let digits: String = rest.chars().filter(|c| *c != ',').collect();
    let value = Decimal::from_str(&digits).ok()?;
    Some((if negative { -value } else { value }, currency))
}

fn parse_setting_ref(s: &str) -> Option<ParsedValue> {
    let split = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)?;
    let (prefix, name) = s.split_at(split);
    let name = name.trim();
    let starts_like_name = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    if !starts_like_name {
        return None;
    }
    let multiplier = if prefix.is_empty() {
        Decimal::ONE
    } else {
        Decimal::from_str(prefix).ok()?
    };
    Some(ParsedValue::SettingRef {
        name: name.to_string(),
        multiplier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, Decimal)]) -> impl Fn(&str) -> Option<Decimal> {
        let map: HashMap<String, Decimal> =
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        move |name| map.get(name).copied()
    }

    #[test]
    fn cpi_is_a_percentage() {
        let mut settings = BTreeMap::new();
        assert_eq!(cpi_rate(&settings), Decimal::ZERO);
        settings.insert("cpi".to_string(), dec!(2.5));
        assert_eq!(cpi_rate(&settings), dec!(0.025));
    }

    #[test]
    fn parses_plain_and_currency_literals() {
        assert_eq!(parse_amount("100").unwrap(), ParsedValue::literal(dec!(100)));
        assert_eq!(
            parse_amount("1,000.50").unwrap(),
            ParsedValue::literal(dec!(1000.50))
        );
        assert_eq!(
            parse_amount("-£5").unwrap(),
            ParsedValue::Literal {
                value: dec!(-5),
                tag: DisplayTag::Currency
            }
        );
        assert_eq!(
            parse_amount("£-5").unwrap(),
            ParsedValue::Literal {
                value: dec!(-5),
                tag: DisplayTag::Currency
            }
        );
    }

    #[test]
    fn parses_percentages_as_fractions() {
        assert_eq!(
            parse_amount("50%").unwrap(),
            ParsedValue::Percentage(dec!(0.5))
        );
        assert_eq!(
            parse_amount("2.5%").unwrap(),
            ParsedValue::Percentage(dec!(0.025))
        );
    }

    #[test]
    fn parses_whole_units_only() {
        assert_eq!(parse_amount("10 units").unwrap(), ParsedValue::Units(dec!(10)));
        assert_eq!(parse_amount("1unit").unwrap(), ParsedValue::Units(dec!(1)));
        assert!(parse_amount("1.5 units").is_err());
    }

    #[test]
    fn parses_setting_references_with_multiplier() {
        assert_eq!(
            parse_amount("stockPrice").unwrap(),
            ParsedValue::SettingRef {
                name: "stockPrice".to_string(),
                multiplier: Decimal::ONE
            }
        );
        assert_eq!(
            parse_amount("2stockPrice").unwrap(),
            ParsedValue::SettingRef {
                name: "stockPrice".to_string(),
                multiplier: dec!(2)
            }
        );
    }

    #[test]
    fn rejects_malformed_strings() {
        for raw in ["", "   ", "%", "1,00.0,0", "12/", "£"] {
            assert!(
                matches!(parse_amount(raw), Err(EngineError::MalformedAmount { .. })),
                "expected {raw:?} to be malformed"
            );
        }
    }

    #[test]
    fn display_keeps_original_notation() {
        for raw in ["£50", "-£5", "25%", "10 units", "2stockPrice", "cpi", "12.5"] {
            assert_eq!(parse_amount(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn resolves_setting_reference_or_fails_malformed() {
        let lookup = settings(&[("stockPrice", dec!(20))]);
        let value = parse_amount("3stockPrice").unwrap();
        assert_eq!(value.resolve(&lookup).unwrap(), dec!(60));

        let missing = parse_amount("bondPrice").unwrap();
        assert_eq!(
            missing.resolve(&lookup),
            Err(EngineError::malformed("bondPrice"))
        );
    }

    #[test]
    fn growth_numbers_are_percent_per_annum() {
        assert_eq!(parse_growth("").unwrap(), ParsedValue::Percentage(dec!(0)));
        assert_eq!(parse_growth("5").unwrap(), ParsedValue::Percentage(dec!(0.05)));
        assert_eq!(parse_growth("5%").unwrap(), ParsedValue::Percentage(dec!(0.05)));

        let lookup = settings(&[("cpi", dec!(2.5))]);
        let growth = parse_growth("cpi").unwrap();
        assert_eq!(annual_rate(&growth, &lookup).unwrap(), dec!(0.025));
    }

    #[test]
    fn settings_resolve_through_references() {
        let resolved = resolve_settings([
            ("base", "100"),
            ("double", "2base"),
            ("quad", "2double"),
            ("start", "01 Jan 2019"),
        ]);
        assert_eq!(resolved.get("double"), Some(&dec!(200)));
        assert_eq!(resolved.get("quad"), Some(&dec!(400)));
        assert!(!resolved.contains_key("start"));
    }

    #[test]
    fn cyclic_settings_are_not_numeric() {
        let resolved = resolve_settings([("a", "b"), ("b", "a"), ("c", "7")]);
        assert!(!resolved.contains_key("a"));
        assert!(!resolved.contains_key("b"));
        assert_eq!(resolved.get("c"), Some(&dec!(7)));
    }
}
