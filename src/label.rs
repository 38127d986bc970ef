//! Typed integer-range sets used as circuit labels (VLAN ids, wavelengths).
//!
//! A label is always held in canonical form: ranges sorted ascending,
//! non-overlapping and non-adjacent. Intersection is how path computation
//! negotiates a value acceptable to every segment of a circuit.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::NsiError;

/// An immutable, canonical set of inclusive integer ranges of one label type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    type_uri: String,
    ranges: Vec<(u32, u32)>,
}

impl Label {
    /// Parse a label from its textual form: a comma-separated mix of
    /// singletons and `lo-hi` ranges, e.g. `"100,200-210,300"`.
    pub fn new(type_uri: impl Into<String>, values: &str) -> Result<Self, NsiError> {
        let tokens: Vec<&str> = values.split(',').collect();
        Self::from_tokens(type_uri, &tokens)
    }

    /// Parse a label from individual textual tokens.
    pub fn from_tokens(type_uri: impl Into<String>, tokens: &[&str]) -> Result<Self, NsiError> {
        let mut ranges = Vec::with_capacity(tokens.len());
        for token in tokens {
            ranges.push(parse_token(token.trim())?);
        }
        Self::from_ranges(type_uri, ranges)
    }

    /// Build a label from explicit inclusive ranges.
    pub fn from_ranges(
        type_uri: impl Into<String>,
        ranges: Vec<(u32, u32)>,
    ) -> Result<Self, NsiError> {
        for &(lo, hi) in &ranges {
            if lo > hi {
                return Err(NsiError::Payload(format!(
                    "label range {lo}-{hi} is in descending order"
                )));
            }
        }
        let ranges = normalize(ranges);
        if ranges.is_empty() {
            return Err(NsiError::Payload("label has no values".into()));
        }
        Ok(Label { type_uri: type_uri.into(), ranges })
    }

    pub fn type_uri(&self) -> &str {
        &self.type_uri
    }

    pub fn ranges(&self) -> &[(u32, u32)] {
        &self.ranges
    }

    /// Intersect with another label of the same type.
    ///
    /// Commutative and idempotent; the result is canonical. An empty result
    /// means the path has no viable common value and fails accordingly.
    pub fn intersect(&self, other: &Label) -> Result<Label, NsiError> {
        if self.type_uri != other.type_uri {
            return Err(NsiError::Payload(format!(
                "cannot intersect labels of different types ({} vs {})",
                self.type_uri, other.type_uri
            )));
        }

        let mut out = Vec::new();
        let (mut a, mut b) = (0, 0);
        while a < self.ranges.len() && b < other.ranges.len() {
            let (a_lo, a_hi) = self.ranges[a];
            let (b_lo, b_hi) = other.ranges[b];
            if a_hi < b_lo {
                a += 1;
            } else if b_hi < a_lo {
                b += 1;
            } else {
                out.push((a_lo.max(b_lo), a_hi.min(b_hi)));
                // advance whichever range ends first; both when they tie
                if a_hi <= b_hi {
                    a += 1;
                }
                if b_hi <= a_hi {
                    b += 1;
                }
            }
        }

        if out.is_empty() {
            return Err(NsiError::EmptyLabelSet);
        }
        Ok(Label { type_uri: self.type_uri.clone(), ranges: out })
    }

    /// Canonical textual form, e.g. `"100,200-210"`.
    pub fn text_value(&self) -> String {
        let parts: Vec<String> = self
            .ranges
            .iter()
            .map(|&(lo, hi)| {
                if lo == hi { lo.to_string() } else { format!("{lo}-{hi}") }
            })
            .collect();
        parts.join(",")
    }

    /// True when the label holds exactly one value.
    pub fn is_single_value(&self) -> bool {
        self.ranges.len() == 1 && self.ranges[0].0 == self.ranges[0].1
    }

    /// The single value, when there is exactly one.
    pub fn single_value(&self) -> Option<u32> {
        if self.is_single_value() { Some(self.ranges[0].0) } else { None }
    }

    pub fn contains(&self, value: u32) -> bool {
        self.ranges.iter().any(|&(lo, hi)| lo <= value && value <= hi)
    }

    /// Flatten all ranges into the full list of values.
    pub fn enumerate_values(&self) -> Vec<u32> {
        self.ranges.iter().flat_map(|&(lo, hi)| lo..=hi).collect()
    }

    /// Pick a range uniformly by index, then a value uniformly within it.
    /// Not uniform over values when ranges differ in length.
    pub fn random_value(&self) -> u32 {
        let mut rng = rand::thread_rng();
        let (lo, hi) = self.ranges[rng.gen_range(0..self.ranges.len())];
        rng.gen_range(lo..=hi)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.type_uri.rsplit('#').next().unwrap_or(&self.type_uri);
        write!(f, "{}={}", short, self.text_value())
    }
}

fn parse_token(token: &str) -> Result<(u32, u32), NsiError> {
    let parse = |s: &str| {
        s.parse::<u32>().map_err(|_| {
            NsiError::Payload(format!(
                "label value {token} is not an integer or an integer range"
            ))
        })
    };
    if let Some((lo, hi)) = token.split_once('-') {
        let (lo, hi) = (parse(lo)?, parse(hi)?);
        if lo > hi {
            return Err(NsiError::Payload(format!(
                "label range {token} is in descending order"
            )));
        }
        Ok((lo, hi))
    } else {
        let v = parse(token)?;
        Ok((v, v))
    }
}

/// Sort ranges and merge any that overlap or are adjacent.
fn normalize(mut ranges: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
    ranges.sort_unstable();
    let mut out: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
    for (lo, hi) in ranges {
        match out.last_mut() {
            Some(last) if lo <= last.1.saturating_add(1) => last.1 = last.1.max(hi),
            _ => out.push((lo, hi)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const VLAN: &str = "http://schemas.ogf.org/nml/2012/10/ethernet#vlan";

    #[test]
    fn test_parse_mixed_singletons_and_ranges() {
        let label = Label::new(VLAN, "100,200-210,300").unwrap();
        assert_eq!(label.ranges(), &[(100, 100), (200, 210), (300, 300)]);
        assert_eq!(label.text_value(), "100,200-210,300");
    }

    #[test]
    fn test_normalization_merges_overlap_and_adjacency() {
        let label = Label::new(VLAN, "210-220,100-105,106-110,205-215").unwrap();
        assert_eq!(label.ranges(), &[(100, 110), (205, 220)]);
    }

    #[test]
    fn test_canonical_invariant_holds() {
        let label = Label::new(VLAN, "5,1-3,9,4,20-30,31").unwrap();
        let ranges = label.ranges();
        for window in ranges.windows(2) {
            assert!(window[0].1 + 1 < window[1].0);
        }
        for &(lo, hi) in ranges {
            assert!(lo <= hi);
        }
    }

    #[test]
    fn test_descending_range_rejected() {
        let err = Label::new(VLAN, "210-200").unwrap_err();
        assert!(matches!(err, NsiError::Payload(_)));
    }

    #[test]
    fn test_non_integer_rejected() {
        assert!(matches!(Label::new(VLAN, "abc").unwrap_err(), NsiError::Payload(_)));
        assert!(matches!(Label::new(VLAN, "1,x-3").unwrap_err(), NsiError::Payload(_)));
    }

    #[test]
    fn test_intersect_soundness() {
        let a = Label::new(VLAN, "100-200,300-400").unwrap();
        let b = Label::new(VLAN, "150-350").unwrap();
        let c = a.intersect(&b).unwrap();
        assert_eq!(c.ranges(), &[(150, 200), (300, 350)]);
        for v in [100u32, 149, 150, 200, 201, 299, 300, 350, 351, 400] {
            assert_eq!(c.contains(v), a.contains(v) && b.contains(v));
        }
    }

    #[test]
    fn test_intersect_commutative_and_idempotent() {
        let a = Label::new(VLAN, "1-10,20-30").unwrap();
        let b = Label::new(VLAN, "5-25").unwrap();
        assert_eq!(a.intersect(&b).unwrap(), b.intersect(&a).unwrap());
        assert_eq!(a.intersect(&a).unwrap(), a);
    }

    #[test]
    fn test_intersect_disjoint_is_empty_label_set() {
        let a = Label::new(VLAN, "100-200").unwrap();
        let b = Label::new(VLAN, "300-400").unwrap();
        assert_eq!(a.intersect(&b).unwrap_err(), NsiError::EmptyLabelSet);
    }

    #[test]
    fn test_intersect_type_mismatch_rejected() {
        let a = Label::new(VLAN, "100").unwrap();
        let b = Label::new("urn:example:wavelength", "100").unwrap();
        assert!(matches!(a.intersect(&b).unwrap_err(), NsiError::Payload(_)));
    }

    #[test]
    fn test_enumerate_values() {
        let label = Label::new(VLAN, "1-3,7").unwrap();
        assert_eq!(label.enumerate_values(), vec![1, 2, 3, 7]);
    }

    #[test]
    fn test_single_value() {
        assert!(Label::new(VLAN, "1780").unwrap().is_single_value());
        assert_eq!(Label::new(VLAN, "1780").unwrap().single_value(), Some(1780));
        assert!(!Label::new(VLAN, "1780-1781").unwrap().is_single_value());
    }

    #[test]
    fn test_random_value_stays_in_set() {
        let label = Label::new(VLAN, "100-102,200").unwrap();
        for _ in 0..200 {
            assert!(label.contains(label.random_value()));
        }
    }

    #[test]
    fn test_text_round_trip() {
        for text in ["100", "100,200-210,300", "1-4094"] {
            let parsed = Label::new(VLAN, text).unwrap();
            let reparsed = Label::new(VLAN, &parsed.text_value()).unwrap();
            assert_eq!(parsed, reparsed);
        }
    }

    #[test]
    fn test_empty_after_normalization_rejected() {
        let err = Label::from_ranges(VLAN, vec![]).unwrap_err();
        assert!(matches!(err, NsiError::Payload(_)));
    }
}
