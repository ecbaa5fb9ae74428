//! Structural and policy checks for creative configs and transformed markup.
//!
//! Nothing here fails on data-quality problems: checks return `bool`, a
//! parsed value, or a list of human-readable warnings.

use std::collections::HashSet;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use url::Url;

use crate::creative::{ConfigError, CreativeFormat, ViewabilityPhase, ViewabilityVendor};
use crate::patterns::{amazon_macro_patterns, dv_patterns, find_tags, ias_patterns};

pub const DEFAULT_SNIPPET_DOMAIN: &str = "snippet.kargo.com";

/// Max client-side IAS tags tolerated in phase 2 before S2S is considered
/// misconfigured.
const PHASE2_MAX_IAS_TAGS: usize = 2;

const REQUIRED_TRACKING_EVENTS: &[&str] = &["start", "complete"];

/// Parse `WIDTHxHEIGHT` into positive integers.
pub fn parse_dimensions(dimensions: &str) -> Result<(u32, u32), ConfigError> {
    let invalid = || ConfigError::InvalidDimensions(dimensions.to_string());
    let (w, h) = dimensions.split_once('x').ok_or_else(invalid)?;
    let parse = |s: &str| -> Option<u32> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse::<u32>().ok().filter(|v| *v > 0)
    };
    match (parse(w), parse(h)) {
        (Some(w), Some(h)) => Ok((w, h)),
        _ => Err(invalid()),
    }
}

pub fn is_display_size(w: u32, h: u32) -> bool {
    matches!(
        (w, h),
        (320, 50) | (728, 90) | (300, 250) | (160, 600) | (970, 250)
    )
}

pub fn is_video_companion_size(w: u32, h: u32) -> bool {
    matches!((w, h), (300, 50) | (320, 50) | (300, 250) | (728, 90))
}

#[derive(Debug, Clone)]
pub struct CreativeValidator {
    snippet_domain: String,
}

impl Default for CreativeValidator {
    fn default() -> Self {
        Self::new(DEFAULT_SNIPPET_DOMAIN)
    }
}

impl CreativeValidator {
    pub fn new(snippet_domain: impl Into<String>) -> Self {
        Self {
            snippet_domain: snippet_domain.into(),
        }
    }

    pub fn snippet_domain(&self) -> &str {
        &self.snippet_domain
    }

    /// Well-formed absolute URL whose host belongs to the snippet provider.
    pub fn validate_snippet_url(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => parsed
                .host_str()
                .is_some_and(|host| host.contains(self.snippet_domain.as_str())),
            Err(_) => false,
        }
    }

    /// Whether the dimensions are a usual size for the format family.
    /// Unparseable dimensions are reported as not matching.
    pub fn validate_format_dimensions(&self, format: CreativeFormat, dimensions: &str) -> bool {
        match parse_dimensions(dimensions) {
            Ok((w, h)) if format.is_video() => is_video_companion_size(w, h),
            Ok((w, h)) => is_display_size(w, h),
            Err(_) => false,
        }
    }

    pub fn detect_ias_tags(&self, markup: &str) -> Vec<String> {
        find_tags(ias_patterns(), markup)
    }

    pub fn detect_dv_tags(&self, markup: &str) -> Vec<String> {
        find_tags(dv_patterns(), markup)
    }

    pub fn detect_amazon_macros(&self, markup: &str) -> Vec<String> {
        find_tags(amazon_macro_patterns(), markup)
    }

    /// Audit declared vendors against the tags physically present in `markup`.
    pub fn validate_phase_configuration(
        &self,
        phase: ViewabilityPhase,
        vendors: &[ViewabilityVendor],
        markup: &str,
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        let ias_tags = self.detect_ias_tags(markup);

        match phase {
            ViewabilityPhase::Phase1 => {
                if vendors.contains(&ViewabilityVendor::Ias) {
                    warnings.push("Phase 1 should not include IAS vendor".to_string());
                }
                if !ias_tags.is_empty() {
                    warnings.push(format!(
                        "Phase 1 creative contains IAS tags that should be removed: {} found",
                        ias_tags.len()
                    ));
                }
                if vendors.contains(&ViewabilityVendor::DoubleVerify)
                    && self.detect_dv_tags(markup).is_empty()
                {
                    warnings.push(
                        "Phase 1 configured for DV but no DV tags found in creative".to_string(),
                    );
                }
            }
            ViewabilityPhase::Phase2 => {
                if !vendors.contains(&ViewabilityVendor::Ias) {
                    warnings
                        .push("Phase 2 should include IAS vendor for S2S integration".to_string());
                }
                if !vendors.contains(&ViewabilityVendor::DoubleVerify) {
                    warnings.push("Phase 2 should include DoubleVerify vendor".to_string());
                }
                if ias_tags.len() > PHASE2_MAX_IAS_TAGS {
                    warnings.push(format!(
                        "Phase 2 creative has excessive IAS tags ({}), S2S should minimize client-side tags",
                        ias_tags.len()
                    ));
                }
            }
        }

        warnings
    }

    /// Parse the document and report each missing VAST building block.
    /// CDATA payloads are opaque, so markup embedded in extensions cannot
    /// satisfy (or break) the structural checks.
    pub fn validate_vast_structure(&self, vast_xml: &str) -> Vec<String> {
        let mut errors = Vec::new();
        let mut seen = VastOutline::default();
        let mut reader = Reader::from_str(vast_xml);

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => seen.record(&e),
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    errors.push(format!(
                        "Malformed VAST XML near byte {}: {}",
                        reader.buffer_position(),
                        e
                    ));
                    break;
                }
            }
        }

        if !seen.vast {
            errors.push("Missing VAST root element".to_string());
        }
        if !seen.ad {
            errors.push("Missing Ad element".to_string());
        }
        if !seen.creative {
            errors.push("Missing Creative element".to_string());
        }
        if !seen.tracking_events {
            errors.push("Missing TrackingEvents element".to_string());
        }
        for event in REQUIRED_TRACKING_EVENTS {
            if !seen.events.contains(*event) {
                errors.push(format!("Missing required tracking event: {}", event));
            }
        }

        errors
    }
}

#[derive(Default)]
struct VastOutline {
    vast: bool,
    ad: bool,
    creative: bool,
    tracking_events: bool,
    events: HashSet<String>,
}

impl VastOutline {
    fn record(&mut self, element: &BytesStart<'_>) {
        match element.local_name().as_ref() {
            b"VAST" => self.vast = true,
            b"Ad" => self.ad = true,
            b"Creative" => self.creative = true,
            b"TrackingEvents" => self.tracking_events = true,
            b"Tracking" => {
                for attr in element.attributes().flatten() {
                    if attr.key.as_ref() == b"event" {
                        self.events
                            .insert(String::from_utf8_lossy(&attr.value).into_owned());
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_VAST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<VAST version="3.0">
  <Ad id="a1">
    <Wrapper>
      <Creatives>
        <Creative>
          <Linear>
            <TrackingEvents>
              <Tracking event="start"><![CDATA[https://t.example/start]]></Tracking>
              <Tracking event="complete"><![CDATA[https://t.example/complete]]></Tracking>
            </TrackingEvents>
          </Linear>
        </Creative>
      </Creatives>
    </Wrapper>
  </Ad>
</VAST>"#;

    #[test]
    fn parse_dimensions_accepts_positive_pairs() {
        assert_eq!(parse_dimensions("320x50").unwrap(), (320, 50));
        assert_eq!(parse_dimensions("1x1").unwrap(), (1, 1));
    }

    #[test]
    fn parse_dimensions_rejects_malformed_input() {
        for bad in ["", "320", "x50", "320x", "0x50", "320x0", "+3x5", "3 x 5", "3x5x7", "axb"] {
            assert!(
                matches!(parse_dimensions(bad), Err(ConfigError::InvalidDimensions(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn snippet_url_requires_scheme_host_and_domain() {
        let v = CreativeValidator::default();
        assert!(v.validate_snippet_url("https://snippet.kargo.com/snippet/dm/81298"));
        assert!(!v.validate_snippet_url("snippet.kargo.com/snippet/dm/81298"));
        assert!(!v.validate_snippet_url("https://example.com/snippet/dm/81298"));
        assert!(!v.validate_snippet_url("not a url"));

        let custom = CreativeValidator::new("snippets.test");
        assert!(custom.validate_snippet_url("http://snippets.test/1"));
    }

    #[test]
    fn format_dimensions_follow_allow_lists() {
        let v = CreativeValidator::default();
        assert!(v.validate_format_dimensions(CreativeFormat::Runway, "320x50"));
        assert!(!v.validate_format_dimensions(CreativeFormat::Runway, "300x50"));
        assert!(v.validate_format_dimensions(CreativeFormat::EnhancedPreroll, "300x50"));
        assert!(!v.validate_format_dimensions(CreativeFormat::InstreamVideo, "160x600"));
        assert!(!v.validate_format_dimensions(CreativeFormat::Runway, "bogus"));
    }

    #[test]
    fn phase1_audit_flags_leftover_ias_and_missing_dv() {
        let v = CreativeValidator::default();
        let markup = r#"<img src="https://pixel.adsafeprotected.com/p.gif">"#;
        let warnings = v.validate_phase_configuration(
            ViewabilityPhase::Phase1,
            &[ViewabilityVendor::DoubleVerify],
            markup,
        );
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].starts_with("Phase 1 creative contains IAS tags"));
        assert!(warnings[1].contains("no DV tags"));
    }

    #[test]
    fn phase1_audit_is_quiet_for_clean_dv_markup() {
        let v = CreativeValidator::default();
        let markup = r#"<script src="https://cdn.doubleverify.com/dvtp_src.js"></script>"#;
        let warnings = v.validate_phase_configuration(
            ViewabilityPhase::Phase1,
            &[ViewabilityVendor::DoubleVerify],
            markup,
        );
        assert!(warnings.is_empty(), "{:?}", warnings);
    }

    #[test]
    fn phase2_audit_flags_missing_vendors_and_excess_ias() {
        let v = CreativeValidator::default();
        let markup = "pixel.adsafeprotected.com/a fw.adsafeprotected.com/b pixel.adsafeprotected.com/c";
        let warnings = v.validate_phase_configuration(ViewabilityPhase::Phase2, &[], markup);
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("IAS vendor"));
        assert!(warnings[1].contains("DoubleVerify"));
        assert!(warnings[2].contains("excessive IAS tags"));
    }

    #[test]
    fn single_ias_pixel_is_one_tag() {
        let v = CreativeValidator::default();
        let markup = r#"<img src="https://pixel.adsafeprotected.com/p.gif" width="1">"#;
        assert_eq!(v.detect_ias_tags(markup).len(), 1);
        let warnings = v.validate_phase_configuration(
            ViewabilityPhase::Phase2,
            &[ViewabilityVendor::Ias, ViewabilityVendor::DoubleVerify],
            markup,
        );
        assert!(warnings.is_empty(), "{:?}", warnings);
    }

    #[test]
    fn phase2_tolerates_pixel_and_script() {
        let v = CreativeValidator::default();
        let markup = r#"<img src="https://pixel.adsafeprotected.com/p.gif" width="1">
<script type="text/javascript" src="https://fw.adsafeprotected.com/s.js">var x = 1;</script>"#;
        assert_eq!(v.detect_ias_tags(markup).len(), 2);
        let warnings = v.validate_phase_configuration(
            ViewabilityPhase::Phase2,
            &[ViewabilityVendor::Ias, ViewabilityVendor::DoubleVerify],
            markup,
        );
        assert!(warnings.is_empty(), "{:?}", warnings);
    }

    #[test]
    fn amazon_macros_are_reported_in_catalog_order() {
        let v = CreativeValidator::default();
        let markup = "cb=${AMAZON_CACHEBUSTER}&u=${AMAZON_CLICK_URL}&c=${AMAZON_CAMPAIGN_ID}";
        assert_eq!(
            v.detect_amazon_macros(markup),
            vec![
                "${AMAZON_CLICK_URL}".to_string(),
                "${AMAZON_CAMPAIGN_ID}".to_string(),
                "${AMAZON_CACHEBUSTER}".to_string(),
            ]
        );
    }

    #[test]
    fn generic_macros_are_not_amazon_macros() {
        let v = CreativeValidator::default();
        assert!(v
            .detect_amazon_macros("<a href=\"${CLICK_URL}\">${CACHEBUSTER}</a>")
            .is_empty());
        assert!(v.detect_amazon_macros("").is_empty());
    }

    #[test]
    fn minimal_vast_has_no_structure_errors() {
        let v = CreativeValidator::default();
        assert!(v.validate_vast_structure(MINIMAL_VAST).is_empty());
    }

    #[test]
    fn vast_missing_complete_event_is_reported() {
        let v = CreativeValidator::default();
        let xml = MINIMAL_VAST.replace("event=\"complete\"", "event=\"midpoint\"");
        assert_eq!(
            v.validate_vast_structure(&xml),
            vec!["Missing required tracking event: complete".to_string()]
        );
    }

    #[test]
    fn html_reports_every_missing_vast_piece() {
        let v = CreativeValidator::default();
        let errors = v.validate_vast_structure("<div>not vast</div>");
        assert_eq!(errors.len(), 6);
        assert_eq!(errors[0], "Missing VAST root element");
    }

    #[test]
    fn vast_inside_cdata_does_not_count() {
        let v = CreativeValidator::default();
        let xml = "<Root><![CDATA[<VAST><Ad><Creative>]]></Root>";
        let errors = v.validate_vast_structure(xml);
        assert!(errors.contains(&"Missing VAST root element".to_string()));
        assert!(errors.contains(&"Missing Ad element".to_string()));
    }

    #[test]
    fn mismatched_tags_are_malformed() {
        let v = CreativeValidator::default();
        let errors = v.validate_vast_structure("<VAST><Ad></VAST>");
        assert!(errors[0].starts_with("Malformed VAST XML"));
    }
}
