use crate::error;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Formatter;
use std::str::FromStr;

/// Root keywords of WKT1 and WKT2 coordinate reference system definitions
const WKT_ROOT_KEYWORDS: [&str; 16] = [
    "PROJCS",
    "GEOGCS",
    "GEOCCS",
    "LOCAL_CS",
    "COMPD_CS",
    "VERT_CS",
    "PROJCRS",
    "PROJECTEDCRS",
    "GEOGCRS",
    "GEOGRAPHICCRS",
    "GEODCRS",
    "GEODETICCRS",
    "ENGCRS",
    "VERTCRS",
    "COMPOUNDCRS",
    "BOUNDCRS",
];

const WGS84_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AXIS["Latitude",NORTH],AXIS["Longitude",EAST],AUTHORITY["EPSG","4326"]]"#;

/// A spatial reference given as well-known-text.
///
/// Two spatial references are equal if their definitions match after
/// removing insignificant whitespace and unifying bracket styles.
#[derive(Debug, Clone)]
pub struct SpatialReference {
    wkt: String,
    normalized: String,
}

impl SpatialReference {
    /// Parses and validates a well-known-text definition
    ///
    /// # Examples
    ///
    /// ```
    /// use applier_datatypes::spatial_reference::SpatialReference;
    ///
    /// let sr = SpatialReference::from_wkt(r#"LOCAL_CS["unknown"]"#).unwrap();
    /// assert_eq!(sr.name(), Some("unknown"));
    ///
    /// assert!(SpatialReference::from_wkt("PROJCS[\"broken\"").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Fails with `InvalidSpatialReference` for malformed definitions
    ///
    pub fn from_wkt(wkt: &str) -> Result<Self, error::Error> {
        let wkt = wkt.trim();
        let normalized = normalize_wkt(wkt)?;

        Ok(Self {
            wkt: wkt.to_owned(),
            normalized,
        })
    }

    /// The WGS 84 geographic spatial reference system (EPSG:4326)
    pub fn wgs84() -> Self {
        Self {
            wkt: WGS84_WKT.to_owned(),
            normalized: WGS84_WKT.to_owned(),
        }
    }

    /// An engineering (local) spatial reference system without a datum.
    /// Used for rasters that are not geo-referenced.
    pub fn local(name: &str) -> Self {
        let wkt = format!("LOCAL_CS[\"{}\"]", name.replace('"', ""));
        Self {
            normalized: wkt.clone(),
            wkt,
        }
    }

    pub fn wkt(&self) -> &str {
        &self.wkt
    }

    /// The name of the root element, i.e. the first quoted string
    pub fn name(&self) -> Option<&str> {
        let start = self.wkt.find('"')? + 1;
        let length = self.wkt[start..].find('"')?;
        Some(&self.wkt[start..start + length])
    }
}

/// Strips whitespace outside of quoted names, unifies brackets and checks
/// that the definition is well-formed.
fn normalize_wkt(wkt: &str) -> Result<String, error::Error> {
    let keyword_end = wkt.find(['[', '(']).ok_or_else(|| invalid("missing opening bracket"))?;
    let keyword = wkt[..keyword_end].trim();

    if !WKT_ROOT_KEYWORDS
        .iter()
        .any(|root| root.eq_ignore_ascii_case(keyword))
    {
        return Err(invalid(&format!("unknown root keyword `{keyword}`")));
    }

    let mut normalized = String::with_capacity(wkt.len());
    let mut depth = 0_usize;
    let mut in_quotes = false;
    let mut closed = false;

    for c in wkt.chars() {
        if in_quotes {
            normalized.push(c);
            if c == '"' {
                in_quotes = false;
            }
            continue;
        }

        if closed && !c.is_whitespace() {
            return Err(invalid("trailing characters after the root element"));
        }

        match c {
            '"' => {
                in_quotes = true;
                normalized.push(c);
            }
            '[' | '(' => {
                depth += 1;
                normalized.push('[');
            }
            ']' | ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid("unbalanced closing bracket"))?;
                normalized.push(']');
                closed = depth == 0;
            }
            c if c.is_whitespace() => {}
            c => normalized.push(c.to_ascii_uppercase()),
        }
    }

    if in_quotes {
        return Err(invalid("unterminated quoted string"));
    }
    if !closed {
        return Err(invalid("unbalanced opening bracket"));
    }

    Ok(normalized)
}

fn invalid(reason: &str) -> error::Error {
    error::Error::InvalidSpatialReference {
        reason: reason.to_owned(),
    }
}

impl PartialEq for SpatialReference {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for SpatialReference {}

impl std::fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.wkt)
    }
}

impl FromStr for SpatialReference {
    type Err = error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wkt(s)
    }
}

impl Serialize for SpatialReference {
    fn serialize<S>(&self, serializer: S) -> Result<<S as Serializer>::Ok, <S as Serializer>::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.wkt)
    }
}

/// Helper struct for deserializing a `SpatialReference`
struct SpatialReferenceDeserializeVisitor;

impl Visitor<'_> for SpatialReferenceDeserializeVisitor {
    type Value = SpatialReference;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a spatial reference in well-known-text form")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse().map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for SpatialReference {
    fn deserialize<D>(deserializer: D) -> Result<Self, <D as Deserializer<'de>>::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(SpatialReferenceDeserializeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wgs84_is_valid() {
        let parsed = SpatialReference::from_wkt(WGS84_WKT).unwrap();
        assert_eq!(parsed, SpatialReference::wgs84());
        assert_eq!(parsed.name(), Some("WGS 84"));
    }

    #[test]
    fn equality_ignores_formatting() {
        let a = SpatialReference::from_wkt(r#"LOCAL_CS["unknown", UNIT["metre", 1]]"#).unwrap();
        let b = SpatialReference::from_wkt("LOCAL_CS(\"unknown\",\n  UNIT(\"metre\",1))").unwrap();
        let c = SpatialReference::from_wkt(r#"LOCAL_CS["other", UNIT["metre", 1]]"#).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn quoted_whitespace_is_significant() {
        let a = SpatialReference::from_wkt(r#"LOCAL_CS["a b"]"#).unwrap();
        let b = SpatialReference::from_wkt(r#"LOCAL_CS["ab"]"#).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn malformed() {
        for wkt in [
            "",
            "EPSG:4326",
            "FOO[\"x\"]",
            "GEOGCS[\"x\"",
            "GEOGCS[\"x]",
            "GEOGCS[\"x\"]]",
            "GEOGCS[\"x\"] GEOGCS[\"y\"]",
        ] {
            assert!(
                matches!(
                    SpatialReference::from_wkt(wkt),
                    Err(error::Error::InvalidSpatialReference { .. })
                ),
                "{wkt} should be rejected"
            );
        }
    }

    #[test]
    fn serde() {
        let sr = SpatialReference::local("test");
        let json = serde_json::to_string(&sr).unwrap();

        assert_eq!(json, r#""LOCAL_CS[\"test\"]""#);
        assert_eq!(
            serde_json::from_str::<SpatialReference>(&json).unwrap(),
            sr
        );
    }
}
