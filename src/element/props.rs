//! Attribute ⇄ property conversion for the custom elements.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::util::casing::to_dashed_case;

static TRUTHY_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^[ty1-9]").unwrap());

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropType {
    Boolean,
    Number,
    String,
    /// Name of a global function the host page exposes, such as an `on-complete` handler.
    Function,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Boolean(bool),
    Number(f64),
    String(String),
    Function(String),
}

impl PropValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::String(value) | PropValue::Function(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Number(value) => Some(*value),
            _ => None,
        }
    }
}

impl PropType {
    /// Parses an attribute value.
    ///
    /// `raw` is `None` when the attribute is absent. Booleans always produce a value: an
    /// empty attribute is `true`, otherwise the value must start with `t`, `y` or `1`-`9`.
    /// Other types produce nothing for absent or empty attributes.
    pub fn parse(self, raw: Option<&str>) -> Option<PropValue> {
        match self {
            PropType::Boolean => Some(PropValue::Boolean(match raw {
                Some("") => true,
                Some(value) => TRUTHY_PATTERN.is_match(value),
                None => false,
            })),
            PropType::Number => raw
                .filter(|value| !value.is_empty())
                .map(|value| PropValue::Number(parse_float_prefix(value))),
            PropType::String => raw
                .filter(|value| !value.is_empty())
                .map(|value| PropValue::String(value.to_owned())),
            PropType::Function => raw
                .filter(|value| !value.is_empty())
                .map(|value| PropValue::Function(value.replace("bound ", ""))),
        }
    }

    /// Attribute text reflected back onto the element for `value`.
    pub fn stringify(self, value: &PropValue) -> String {
        match (self, value) {
            (PropType::Boolean, PropValue::Boolean(value)) => value.to_string(),
            (PropType::Boolean, PropValue::String(text)) => {
                (text.is_empty() || TRUTHY_PATTERN.is_match(text)).to_string()
            }
            (_, PropValue::Number(number)) => format_number(*number),
            (_, PropValue::Function(name)) => name.replace("bound ", ""),
            (_, PropValue::String(text)) => text.clone(),
            (_, PropValue::Boolean(value)) => value.to_string(),
        }
    }
}

/// `parseFloat` semantics: the longest numeric prefix, `NaN` when there is none.
fn parse_float_prefix(value: &str) -> f64 {
    let trimmed = value.trim_start();
    let mut best = f64::NAN;
    for (index, ch) in trimmed.char_indices() {
        let end = index + ch.len_utf8();
        if let Ok(parsed) = trimmed[..end].parse::<f64>() {
            best = parsed;
        } else if !matches!(ch, '+' | '-' | '.' | 'e' | 'E') {
            break;
        }
    }
    best
}

fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{}", value as i64)
    } else if value.is_nan() {
        "NaN".to_owned()
    } else {
        value.to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropSpec {
    pub attribute: String,
    pub prop: String,
    pub kind: PropType,
}

/// Observed attributes of one custom element, keyed by dashed attribute name.
#[derive(Clone, Debug, Default)]
pub struct PropsMap {
    specs: BTreeMap<String, PropSpec>,
}

impl PropsMap {
    pub fn new<'a>(props: impl IntoIterator<Item = (&'a str, PropType)>) -> Self {
        let specs = props
            .into_iter()
            .map(|(prop, kind)| {
                let attribute = to_dashed_case(prop);
                (
                    attribute.clone(),
                    PropSpec {
                        attribute,
                        prop: prop.to_owned(),
                        kind,
                    },
                )
            })
            .collect();
        Self { specs }
    }

    pub fn observed_attributes(&self) -> Vec<&str> {
        self.specs.keys().map(String::as_str).collect()
    }

    pub fn get(&self, attribute: &str) -> Option<&PropSpec> {
        self.specs.get(attribute)
    }

    /// Reads every observed attribute through `read` and returns the parsed props keyed by
    /// property name.
    pub fn read_all<F>(&self, read: F) -> BTreeMap<String, PropValue>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.specs
            .values()
            .filter_map(|spec| {
                let raw = read(&spec.attribute);
                spec.kind
                    .parse(raw.as_deref())
                    .map(|value| (spec.prop.clone(), value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_attributes() {
        assert_eq!(PropType::Boolean.parse(Some("")), Some(PropValue::Boolean(true)));
        assert_eq!(PropType::Boolean.parse(Some("Yes")), Some(PropValue::Boolean(true)));
        assert_eq!(PropType::Boolean.parse(Some("1")), Some(PropValue::Boolean(true)));
        assert_eq!(PropType::Boolean.parse(Some("false")), Some(PropValue::Boolean(false)));
        assert_eq!(PropType::Boolean.parse(Some("0")), Some(PropValue::Boolean(false)));
        assert_eq!(PropType::Boolean.parse(None), Some(PropValue::Boolean(false)));
    }

    #[test]
    fn numbers_use_numeric_prefix() {
        assert_eq!(PropType::Number.parse(Some("42")), Some(PropValue::Number(42.0)));
        assert_eq!(PropType::Number.parse(Some("1.5px")), Some(PropValue::Number(1.5)));
        assert!(PropType::Number
            .parse(Some("abc"))
            .and_then(|value| value.as_f64())
            .is_some_and(f64::is_nan));
        assert_eq!(PropType::Number.parse(Some("")), None);
    }

    #[test]
    fn function_names_drop_bound_prefix() {
        assert_eq!(
            PropType::Function.parse(Some("bound onComplete")),
            Some(PropValue::Function("onComplete".into()))
        );
        assert_eq!(PropType::Function.parse(None), None);
    }

    #[test]
    fn stringify_matches_attribute_text() {
        assert_eq!(PropType::Number.stringify(&PropValue::Number(3.0)), "3");
        assert_eq!(PropType::Number.stringify(&PropValue::Number(0.25)), "0.25");
        assert_eq!(PropType::Boolean.stringify(&PropValue::String(String::new())), "true");
        assert_eq!(PropType::Boolean.stringify(&PropValue::String("no".into())), "false");
    }

    #[test]
    fn props_map_reads_dashed_attributes() {
        let map = PropsMap::new([
            ("clientId", PropType::String),
            ("autoOpen", PropType::Boolean),
            ("minimumHeight", PropType::Number),
        ]);
        assert_eq!(
            map.observed_attributes(),
            ["auto-open", "client-id", "minimum-height"]
        );

        let props = map.read_all(|attribute| match attribute {
            "client-id" => Some("abc".into()),
            _ => None,
        });
        assert_eq!(props.get("clientId"), Some(&PropValue::String("abc".into())));
        assert_eq!(props.get("autoOpen"), Some(&PropValue::Boolean(false)));
        assert!(!props.contains_key("minimumHeight"));
    }
}
