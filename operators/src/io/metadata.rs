use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The metadata domain holding the items of ENVI headers
pub const ENVI_DOMAIN: &str = "ENVI";

/// The unnamed default metadata domain
pub const DEFAULT_DOMAIN: &str = "";

/// A metadata item value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Number(f64),
    String(String),
    List(Vec<MetadataValue>),
}

impl MetadataValue {
    /// Parses a value in ENVI header notation, lists are enclosed in braces: `{a, b, c}`
    pub fn parse_envi(text: &str) -> Self {
        let text = text.trim();

        match text
            .strip_prefix('{')
            .and_then(|inner| inner.strip_suffix('}'))
        {
            Some(inner) if inner.trim().is_empty() => MetadataValue::List(Vec::new()),
            Some(inner) => MetadataValue::List(inner.split(',').map(Self::parse_scalar).collect()),
            None => Self::parse_scalar(text),
        }
    }

    fn parse_scalar(text: &str) -> Self {
        let text = text.trim();
        match text.parse::<f64>() {
            Ok(number) if !text.is_empty() => MetadataValue::Number(number),
            _ => MetadataValue::String(text.to_string()),
        }
    }

    /// Formats the value in ENVI header notation
    pub fn to_envi_string(&self) -> String {
        match self {
            MetadataValue::Number(number) => number.to_string(),
            MetadataValue::String(string) => string.clone(),
            MetadataValue::List(values) => {
                format!("{{{}}}", values.iter().map(Self::to_envi_string).join(", "))
            }
        }
    }

    /// The value as a number, single element lists included
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(number) => Some(*number),
            MetadataValue::String(string) => string.trim().parse().ok(),
            MetadataValue::List(values) if values.len() == 1 => values[0].as_f64(),
            MetadataValue::List(_) => None,
        }
    }

    /// The value as a list of numbers, scalars become single element lists
    pub fn as_f64_list(&self) -> Option<Vec<f64>> {
        match self {
            MetadataValue::List(values) => values.iter().map(Self::as_f64).collect(),
            scalar => scalar.as_f64().map(|number| vec![number]),
        }
    }

    /// The value as a list of strings, scalars become single element lists
    pub fn as_string_list(&self) -> Vec<String> {
        match self {
            MetadataValue::List(values) => values.iter().map(Self::to_envi_string).collect(),
            scalar => vec![scalar.to_envi_string()],
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_envi_string())
    }
}

impl From<f64> for MetadataValue {
    fn from(number: f64) -> Self {
        MetadataValue::Number(number)
    }
}

impl From<&str> for MetadataValue {
    fn from(string: &str) -> Self {
        MetadataValue::String(string.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(string: String) -> Self {
        MetadataValue::String(string)
    }
}

impl From<Vec<f64>> for MetadataValue {
    fn from(numbers: Vec<f64>) -> Self {
        MetadataValue::List(numbers.into_iter().map(MetadataValue::Number).collect())
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(strings: Vec<String>) -> Self {
        MetadataValue::List(strings.into_iter().map(MetadataValue::String).collect())
    }
}

/// Metadata items grouped by domain.
///
/// Keys are case insensitive and stored in lower case.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataDomains {
    domains: BTreeMap<String, BTreeMap<String, MetadataValue>>,
}

impl MetadataDomains {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_item(&mut self, key: &str, value: MetadataValue, domain: &str) {
        self.domains
            .entry(domain.to_string())
            .or_default()
            .insert(normalize_key(key), value);
    }

    pub fn item(&self, key: &str, domain: &str) -> Option<&MetadataValue> {
        self.domains.get(domain)?.get(&normalize_key(key))
    }

    pub fn remove_item(&mut self, key: &str, domain: &str) -> Option<MetadataValue> {
        let items = self.domains.get_mut(domain)?;
        let value = items.remove(&normalize_key(key));
        if items.is_empty() {
            self.domains.remove(domain);
        }
        value
    }

    pub fn domain(&self, domain: &str) -> Option<&BTreeMap<String, MetadataValue>> {
        self.domains.get(domain)
    }

    pub fn domain_names(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Copies all items of `other`, overwriting existing ones
    pub fn merge(&mut self, other: &MetadataDomains) {
        for (domain, items) in &other.domains {
            let target = self.domains.entry(domain.clone()).or_default();
            for (key, value) in items {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn envi_lists() {
        let value = MetadataValue::parse_envi(" {450.5, 500,\n 650} ");

        assert_eq!(value, MetadataValue::from(vec![450.5, 500., 650.]));
        assert_eq!(value.to_envi_string(), "{450.5, 500, 650}");
        assert_eq!(value.as_f64_list(), Some(vec![450.5, 500., 650.]));
        assert_eq!(value.as_f64(), None);
    }

    #[test]
    fn envi_scalars() {
        assert_eq!(MetadataValue::parse_envi("-9999"), MetadataValue::Number(-9999.));
        assert_eq!(
            MetadataValue::parse_envi("Nanometers"),
            MetadataValue::String("Nanometers".to_string())
        );
        assert_eq!(MetadataValue::parse_envi("{}"), MetadataValue::List(vec![]));
        assert_eq!(MetadataValue::parse_envi("{7}").as_f64(), Some(7.));
    }

    #[test]
    fn string_lists() {
        let value = MetadataValue::parse_envi("{band 1, band 2}");

        assert_eq!(value.as_string_list(), vec!["band 1", "band 2"]);
        assert_eq!(value.as_f64_list(), None);
        assert_eq!(MetadataValue::from("red").as_string_list(), vec!["red"]);
    }

    #[test]
    fn domains() {
        let mut metadata = MetadataDomains::new();
        metadata.set_item("Wavelength Units", "Nanometers".into(), ENVI_DOMAIN);
        metadata.set_item("AREA_OR_POINT", "Area".into(), DEFAULT_DOMAIN);

        assert_eq!(
            metadata.item("wavelength units", ENVI_DOMAIN),
            Some(&MetadataValue::from("Nanometers"))
        );
        assert!(metadata.item("wavelength units", DEFAULT_DOMAIN).is_none());
        assert_eq!(metadata.domain_names().collect::<Vec<_>>(), vec!["", "ENVI"]);

        let mut other = MetadataDomains::new();
        other.set_item("wavelength units", "Micrometers".into(), ENVI_DOMAIN);
        metadata.merge(&other);
        assert_eq!(
            metadata.item("WAVELENGTH UNITS", ENVI_DOMAIN),
            Some(&MetadataValue::from("Micrometers"))
        );

        metadata.remove_item("area_or_point", DEFAULT_DOMAIN);
        assert_eq!(metadata.domain_names().collect::<Vec<_>>(), vec!["ENVI"]);
    }

    #[test]
    fn serializes_untagged() {
        let mut metadata = MetadataDomains::new();
        metadata.set_item("fwhm", vec![5., 6.].into(), ENVI_DOMAIN);

        assert_eq!(
            serde_json::to_value(&metadata).unwrap(),
            serde_json::json!({"ENVI": {"fwhm": [5.0, 6.0]}})
        );
    }
}
