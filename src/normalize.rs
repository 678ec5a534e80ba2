//! Channel name canonicalization.
//!
//! Turns a raw channel name (`"UK: Sky Sports+ HD"`) into an uppercase,
//! space-separated token string (`"SKY SPORTS AND"`) that two sources can
//! compare for identity. The steps run in a fixed order:
//!
//! 1. uppercase
//! 2. strip one leading region prefix (`UK:`, `US:`, ...)
//! 3. drop quality markers (`HD`, `SD`, `FHD`, `UHD`, `4K`, `HEVC`, `H265`, `H.265`) as whole words
//! 4. replace `&` and `+` with `AND`
//! 5. replace all other punctuation with spaces and collapse whitespace
//! 6. drop generic trailing words (`CHANNEL`, `TV`, `NETWORK`, and `INDIA` for catalogs)
//!
//! Quality markers are dropped again at token level and trailing words are
//! dropped after punctuation is gone, so `normalize(normalize(x)) == normalize(x)`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Region prefixes recognized when no explicit list is configured.
pub const DEFAULT_REGION_PREFIXES: &[&str] = &["UK:", "US:", "IN:", "CA:"];

const QUALITY_TOKENS: &[&str] = &["HD", "SD", "FHD", "UHD", "4K", "HEVC", "H265"];
const GUIDE_SUFFIXES: &[&str] = &["CHANNEL", "TV", "NETWORK"];
const CATALOG_SUFFIXES: &[&str] = &["CHANNEL", "TV", "NETWORK", "INDIA"];

static QUALITY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(HD|SD|FHD|UHD|4K|HEVC|H265|H\.265)\b").unwrap());

static STANDARD: Lazy<Normalizer> = Lazy::new(Normalizer::standard);

/// Normalize with the standard profile and the default region prefixes.
pub fn normalize(name: &str) -> String {
    STANDARD.normalize(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalizer {
    region_prefixes: Vec<String>,
    suffixes: &'static [&'static str],
}

impl Normalizer {
    /// General-purpose profile.
    pub fn standard() -> Self {
        Self {
            region_prefixes: default_prefixes(),
            suffixes: GUIDE_SUFFIXES,
        }
    }

    /// Profile used by both matching modes; also drops a trailing `INDIA`.
    pub fn catalog() -> Self {
        Self {
            region_prefixes: default_prefixes(),
            suffixes: CATALOG_SUFFIXES,
        }
    }

    /// Replace the literal region prefixes this normalizer strips.
    pub fn with_region_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.region_prefixes = prefixes
            .into_iter()
            .map(|p| p.as_ref().trim().to_uppercase())
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    pub fn region_prefixes(&self) -> &[String] {
        &self.region_prefixes
    }

    pub fn normalize(&self, name: &str) -> String {
        let upper = name.to_uppercase();
        let unprefixed = self.strip_region_prefix(upper.trim());
        let without_quality = QUALITY_PATTERN.replace_all(unprefixed, " ");

        let mut spaced = String::with_capacity(without_quality.len() + 8);
        for c in without_quality.chars() {
            match c {
                '&' | '+' => spaced.push_str(" AND "),
                c if c.is_alphanumeric() => spaced.push(c),
                _ => spaced.push(' '),
            }
        }

        let mut tokens: Vec<&str> = spaced
            .split_whitespace()
            .filter(|t| !QUALITY_TOKENS.contains(t))
            .collect();
        while tokens.len() > 1 && tokens.last().is_some_and(|t| self.suffixes.contains(t)) {
            tokens.pop();
        }
        tokens.join(" ")
    }

    fn strip_region_prefix<'a>(&self, upper: &'a str) -> &'a str {
        for prefix in &self.region_prefixes {
            if let Some(rest) = upper.strip_prefix(prefix.as_str()) {
                return rest.trim_start();
            }
        }
        upper
    }
}

fn default_prefixes() -> Vec<String> {
    DEFAULT_REGION_PREFIXES.iter().map(|p| p.to_string()).collect()
}
