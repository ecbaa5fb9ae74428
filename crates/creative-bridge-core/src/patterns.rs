//! Declarative catalogs of third-party measurement tags and DSP macros.
//!
//! Each vendor catalog is an ordered list of case-insensitive, dot-matches-newline
//! regexes: tag-shaped patterns first, bare domain references last, so a whole
//! `<script>` is consumed before its `src` domain would be matched on its own.

use std::sync::LazyLock;

use phf::phf_ordered_map;
use regex::Regex;

/// IAS (Integral Ad Science) signatures.
const IAS_PATTERNS: &[&str] = &[
    r"<img[^>]*adsafeprotected[^>]*>",
    r"<script[^>]*adsafeprotected[^>]*>.*?</script>",
    r"<script[^>]*fw\.adsafeprotected[^>]*>.*?</script>",
    r#"pixel\.adsafeprotected\.com[^"'\s>]*"#,
    r#"fw\.adsafeprotected\.com[^"'\s>]*"#,
    r#"(?:[a-z0-9-]+\.)*adsafeprotected\.com[^"'\s>]*"#,
];

/// DoubleVerify signatures.
const DV_PATTERNS: &[&str] = &[
    r"<img[^>]*doubleverify[^>]*>",
    r"<script[^>]*doubleverify[^>]*>.*?</script>",
    r"<script[^>]*dvtp_src[^>]*>.*?</script>",
    r#"tps\.doubleverify\.com[^"'\s>]*"#,
    r#"cdn\.doubleverify\.com[^"'\s>]*"#,
];

/// Generic placeholder to Amazon DSP placeholder, applied in declaration order.
pub static AMAZON_MACROS: phf::OrderedMap<&'static str, &'static str> = phf_ordered_map! {
    "${CLICK_URL}" => "${AMAZON_CLICK_URL}",
    "${IMPRESSION_URL}" => "${AMAZON_IMPRESSION_URL}",
    "${CAMPAIGN_ID}" => "${AMAZON_CAMPAIGN_ID}",
    "${CREATIVE_ID}" => "${AMAZON_CREATIVE_ID}",
    "${PLACEMENT_ID}" => "${AMAZON_PLACEMENT_ID}",
    "${SITE_ID}" => "${AMAZON_SITE_ID}",
    "${CACHEBUSTER}" => "${AMAZON_CACHEBUSTER}",
    "${GDPR}" => "${AMAZON_GDPR}",
    "${GDPR_CONSENT}" => "${AMAZON_GDPR_CONSENT}",
};

pub const GENERIC_CACHEBUSTER: &str = "${CACHEBUSTER}";
pub const AMAZON_CACHEBUSTER: &str = "${AMAZON_CACHEBUSTER}";

/// Platform macros the validator looks for when auditing output.
const AMAZON_MACRO_PATTERNS: &[&str] = &[
    r"\$\{AMAZON_CLICK_URL\}",
    r"\$\{AMAZON_IMPRESSION_URL\}",
    r"\$\{AMAZON_CAMPAIGN_ID\}",
    r"\$\{AMAZON_CREATIVE_ID\}",
    r"\$\{AMAZON_PLACEMENT_ID\}",
    r"\$\{AMAZON_CACHEBUSTER\}",
];

fn compile(patterns: &[&str], flags: &str) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            // Patterns are compile-time constants covered by tests.
            Regex::new(&format!("{}{}", flags, p)).expect("static tag pattern must compile")
        })
        .collect()
}

static IAS_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(IAS_PATTERNS, "(?is)"));
static DV_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(DV_PATTERNS, "(?is)"));
static MACRO_REGEXES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(AMAZON_MACRO_PATTERNS, ""));

pub fn ias_patterns() -> &'static [Regex] {
    &IAS_REGEXES
}

pub fn dv_patterns() -> &'static [Regex] {
    &DV_REGEXES
}

pub fn amazon_macro_patterns() -> &'static [Regex] {
    &MACRO_REGEXES
}

/// Collect distinct tags, in pattern order. A match lying inside one already
/// collected (the domain of an `<img>` pixel, say) is the same tag and is
/// skipped.
pub fn find_tags(patterns: &[Regex], markup: &str) -> Vec<String> {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut found = Vec::new();
    for re in patterns {
        for m in re.find_iter(markup) {
            if spans.iter().any(|&(s, e)| s <= m.start() && m.end() <= e) {
                continue;
            }
            spans.push((m.start(), m.end()));
            found.push(m.as_str().to_string());
        }
    }
    found
}
