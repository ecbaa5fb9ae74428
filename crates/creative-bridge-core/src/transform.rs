//! Pure markup transformations: tag stripping, macro and cache-buster
//! injection, and the four format/phase wrappers.
//!
//! Wrappers never fail. They wrap whatever markup they are given; structure is
//! checked afterwards by [`crate::validation::CreativeValidator`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::Serialize;

use crate::creative::{CreativeConfig, CreativeFormat, ViewabilityPhase};
use crate::patterns::{ias_patterns, AMAZON_CACHEBUSTER, AMAZON_MACROS, GENERIC_CACHEBUSTER};
use crate::render::{
    cdata_safe, render_template_str, script_json, DISPLAY_WRAPPER_TMPL, VAST_WRAPPER_TMPL,
};

pub const FEATURE_AMAZON_MACROS: &str = "amazon_macros";
pub const FEATURE_CACHE_BUSTER: &str = "cache_buster";
pub const FEATURE_DISPLAY_WRAPPER: &str = "amazon_dsp_wrapper";
pub const FEATURE_VAST_WRAPPER: &str = "vast_wrapper";

/// Measurement method the display wrapper declares, independent of the
/// free-form method on the config.
const DISPLAY_PHASE1_METHOD: &str = "platform_native";
const DISPLAY_PHASE2_METHOD: &str = "s2s_plus_native";

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("blank line pattern must compile"));

static LAST_CACHE_BUSTER: AtomicU64 = AtomicU64::new(0);

/// Strip every IAS tag. Returns the cleaned markup and each removed match in
/// pattern order.
pub fn remove_ias_tags(markup: &str) -> (String, Vec<String>) {
    let mut removed = Vec::new();
    let mut cleaned = markup.to_string();

    for re in ias_patterns() {
        let matches: Vec<String> = re
            .find_iter(&cleaned)
            .map(|m| m.as_str().to_string())
            .collect();
        if !matches.is_empty() {
            removed.extend(matches);
            cleaned = re.replace_all(&cleaned, "").into_owned();
        }
    }

    let collapsed = BLANK_LINES.replace_all(&cleaned, "\n");
    (collapsed.trim().to_string(), removed)
}

/// Swap generic macros for their Amazon DSP equivalents. Absent macros are
/// left alone, so applying this twice is the same as applying it once.
pub fn inject_amazon_macros(markup: &str) -> String {
    AMAZON_MACROS
        .entries()
        .fold(markup.to_string(), |acc, (generic, amazon)| {
            acc.replace(generic, amazon)
        })
}

/// Millisecond timestamp, bumped when needed so that no two calls in one
/// process return the same token.
pub fn generate_cache_buster() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let mut prev = LAST_CACHE_BUSTER.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_CACHE_BUSTER.compare_exchange_weak(
            prev,
            next,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return next.to_string(),
            Err(actual) => prev = actual,
        }
    }
}

pub fn inject_cache_buster(markup: &str, token: Option<&str>) -> String {
    let token = match token {
        Some(t) => t.to_string(),
        None => generate_cache_buster(),
    };
    markup
        .replace(GENERIC_CACHEBUSTER, &token)
        .replace(AMAZON_CACHEBUSTER, &token)
}

/// `HH:MM:SS` as required by the VAST `Duration` element.
pub fn format_duration(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[derive(Serialize)]
struct DisplayPhase1Config<'a> {
    format: &'static str,
    creative_name: &'a str,
    dimensions: &'a str,
    device_type: &'static str,
    viewability_vendor: &'static str,
    viewability_method: &'static str,
    phase: &'static str,
}

#[derive(Serialize)]
struct DisplayPhase2Config<'a> {
    format: &'static str,
    creative_name: &'a str,
    dimensions: &'a str,
    device_type: &'static str,
    viewability_vendors: [&'static str; 2],
    viewability_method: &'static str,
    phase: &'static str,
    ias_s2s_enabled: bool,
    dsp_seat_id: Option<&'a str>,
    pub_id: Option<&'a str>,
}

#[derive(Serialize)]
struct IasS2sConfig<'a> {
    seat_id: Option<&'a str>,
    publisher_id: Option<&'a str>,
    campaign_id: &'static str,
    creative_id: &'static str,
    measurement_method: &'static str,
}

fn render_display(
    markup: &str,
    phase: ViewabilityPhase,
    config_json: String,
    s2s_json: Option<String>,
    method: &'static str,
) -> String {
    let data = serde_json::json!({
        "CONFIG_JSON": config_json,
        "METHOD_JS": script_json(&method),
        "PHASE": phase.as_str(),
        "S2S_JSON": s2s_json,
        "SNIPPET": markup,
    });
    render_template_str(DISPLAY_WRAPPER_TMPL, &data)
        .trim()
        .to_string()
}

/// HTML5 display wrapper, DoubleVerify only.
pub fn wrap_display_phase1(markup: &str, config: &CreativeConfig) -> String {
    let method = DISPLAY_PHASE1_METHOD;
    let block = DisplayPhase1Config {
        format: "display_html5",
        creative_name: &config.name,
        dimensions: &config.dimensions,
        device_type: config.device_type.as_str(),
        viewability_vendor: "double_verify",
        viewability_method: method,
        phase: ViewabilityPhase::Phase1.as_str(),
    };
    render_display(
        markup,
        ViewabilityPhase::Phase1,
        script_json(&block),
        None,
        method,
    )
}

/// HTML5 display wrapper with IAS server-to-server config alongside DV.
pub fn wrap_display_phase2(markup: &str, config: &CreativeConfig) -> String {
    let viewability = &config.viewability_config;
    let method = DISPLAY_PHASE2_METHOD;
    let block = DisplayPhase2Config {
        format: "display_html5",
        creative_name: &config.name,
        dimensions: &config.dimensions,
        device_type: config.device_type.as_str(),
        viewability_vendors: ["ias", "double_verify"],
        viewability_method: method,
        phase: ViewabilityPhase::Phase2.as_str(),
        ias_s2s_enabled: true,
        dsp_seat_id: viewability.dsp_seat_id(),
        pub_id: viewability.pub_id(),
    };
    let s2s = IasS2sConfig {
        seat_id: viewability.dsp_seat_id(),
        publisher_id: viewability.pub_id(),
        campaign_id: "${AMAZON_CAMPAIGN_ID}",
        creative_id: "${AMAZON_CREATIVE_ID}",
        measurement_method: "server_to_server",
    };
    render_display(
        markup,
        ViewabilityPhase::Phase2,
        script_json(&block),
        Some(script_json(&s2s)),
        method,
    )
}

const TRACKING_EVENTS: [(&str, &str); 5] = [
    ("start", "start"),
    ("firstQuartile", "25"),
    ("midpoint", "50"),
    ("thirdQuartile", "75"),
    ("complete", "complete"),
];

fn tag_uri(snippet_url: &str) -> String {
    let sep = if snippet_url.contains('?') { '&' } else { '?' };
    format!("{}{}cb={}", snippet_url, sep, AMAZON_CACHEBUSTER)
}

fn render_vast(markup: &str, config: &CreativeConfig, phase: ViewabilityPhase) -> String {
    let viewability = &config.viewability_config;
    let phase2 = phase == ViewabilityPhase::Phase2;

    let canvas = if config.branded_canvas {
        let (w, h) = config
            .dimensions
            .split_once('x')
            .unwrap_or((config.dimensions.as_str(), ""));
        serde_json::json!({"W": w, "H": h})
    } else {
        serde_json::Value::Null
    };
    let s2s = if phase2 {
        serde_json::json!({
            "SEAT_ID": viewability.dsp_seat_id().unwrap_or_default(),
            "PUB_ID": viewability.pub_id().unwrap_or_default(),
        })
    } else {
        serde_json::Value::Null
    };
    let tracking: Vec<serde_json::Value> = TRACKING_EVENTS
        .iter()
        .map(|(event, code)| serde_json::json!({"event": event, "code": code}))
        .collect();
    let (ad_system_phase, phase_tag, method) = if phase2 {
        ("Phase 2", "phase2", "ias_s2s_plus_dv_wrapped")
    } else {
        ("Phase 1", "phase1", "dv_wrapped")
    };

    let data = serde_json::json!({
        "AD_ID": format!("{}_{}", config.name, phase_tag),
        "AD_SYSTEM_PHASE": ad_system_phase,
        "CANVAS": canvas,
        "DURATION": format_duration(config.duration.unwrap_or_default()),
        "METHOD": method,
        "NAME": config.name,
        "PHASE": phase.as_str(),
        "PHASE_TAG": phase_tag,
        "S2S": s2s,
        "SOURCE": cdata_safe(markup),
        "TAG_URI": cdata_safe(&tag_uri(&config.snippet_url)),
        "TRACKING": tracking,
    });
    render_template_str(VAST_WRAPPER_TMPL, &data)
        .trim()
        .to_string()
}

/// VAST 3.0 wrapper with DoubleVerify wrapped tracking.
pub fn wrap_vast_phase1(markup: &str, config: &CreativeConfig) -> String {
    render_vast(markup, config, ViewabilityPhase::Phase1)
}

/// VAST 3.0 wrapper with the IAS S2S extension and dual-vendor flag.
pub fn wrap_vast_phase2(markup: &str, config: &CreativeConfig) -> String {
    render_vast(markup, config, ViewabilityPhase::Phase2)
}

/// The wrapper chosen for a `(format, phase)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    DisplayPhase1,
    DisplayPhase2,
    VastPhase1,
    VastPhase2,
}

impl Wrapper {
    pub fn select(format: CreativeFormat, phase: ViewabilityPhase) -> Self {
        match (format.is_video(), phase) {
            (false, ViewabilityPhase::Phase1) => Wrapper::DisplayPhase1,
            (false, ViewabilityPhase::Phase2) => Wrapper::DisplayPhase2,
            (true, ViewabilityPhase::Phase1) => Wrapper::VastPhase1,
            (true, ViewabilityPhase::Phase2) => Wrapper::VastPhase2,
        }
    }

    pub fn apply(&self, markup: &str, config: &CreativeConfig) -> String {
        match self {
            Wrapper::DisplayPhase1 => wrap_display_phase1(markup, config),
            Wrapper::DisplayPhase2 => wrap_display_phase2(markup, config),
            Wrapper::VastPhase1 => wrap_vast_phase1(markup, config),
            Wrapper::VastPhase2 => wrap_vast_phase2(markup, config),
        }
    }

    /// Label recorded in `ProcessingMetadata::tags_added`.
    pub fn feature_label(&self) -> &'static str {
        match self {
            Wrapper::DisplayPhase1 | Wrapper::DisplayPhase2 => FEATURE_DISPLAY_WRAPPER,
            Wrapper::VastPhase1 | Wrapper::VastPhase2 => FEATURE_VAST_WRAPPER,
        }
    }
}
