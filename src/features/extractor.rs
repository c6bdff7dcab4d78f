// src/features/extractor.rs — Event → fixed-length feature vector

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::core::types::{Event, EventKind};
use crate::features::tokens;

/// Ordered feature values, each normalized into [0, 1].
pub type FeatureVector = Vec<f32>;

/// Context ids are reduced modulo this before normalization.
const CONTEXT_MODULUS: i64 = 16;

/// First slot available to kind-specific features.
const KIND_SLOT: usize = 7;

const DEFAULT_VIEWPORT_WIDTH: f64 = 1920.0;
const DEFAULT_VIEWPORT_HEIGHT: f64 = 1080.0;

/// Pure, stateless feature extraction.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    dimension: usize,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(18)
    }
}

impl FeatureExtractor {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn base_token(&self, event: &Event) -> String {
        tokens::base_token(event)
    }

    /// Build the feature vector. Malformed payload values degrade to zeros.
    pub fn extract(&self, event: &Event) -> FeatureVector {
        let mut v: Vec<f32> = Vec::with_capacity(KIND_SLOT + 4);

        let kinds = EventKind::all().len() - 1;
        v.push(event.kind.index() as f32 / kinds as f32);
        v.extend(time_features(event.timestamp));
        v.push(context_feature(event.context.tab_id));
        v.push(context_feature(event.context.window_id));
        v.push(if event.payload.target_selector.is_some() {
            1.0
        } else {
            0.0
        });
        v.extend(kind_features(event));

        let mut malformed = false;
        for x in v.iter_mut() {
            if !x.is_finite() {
                malformed = true;
                *x = 0.0;
            }
            *x = x.clamp(0.0, 1.0);
        }
        if malformed {
            tracing::debug!(kind = %event.kind, "Malformed feature values replaced with defaults");
        }

        v.resize(self.dimension, 0.0);
        v
    }
}

/// Hour of day, minute of hour, day of week, each in [0, 1].
fn time_features(timestamp_ms: i64) -> [f32; 3] {
    match DateTime::<Utc>::from_timestamp_millis(timestamp_ms) {
        Some(t) => [
            t.hour() as f32 / 23.0,
            t.minute() as f32 / 59.0,
            t.weekday().num_days_from_monday() as f32 / 6.0,
        ],
        None => {
            tracing::debug!(timestamp_ms, "Timestamp out of range, time features zeroed");
            [0.0; 3]
        }
    }
}

fn context_feature(id: Option<i64>) -> f32 {
    match id {
        Some(id) => id.rem_euclid(CONTEXT_MODULUS) as f32 / (CONTEXT_MODULUS - 1) as f32,
        None => 0.0,
    }
}

/// Map an unbounded non-negative quantity into [0, 1).
fn squash(x: f64, scale: f64) -> f32 {
    if !x.is_finite() || x <= 0.0 {
        return 0.0;
    }
    (x / (x + scale)) as f32
}

fn ratio(x: f64, max: f64) -> f32 {
    if max <= 0.0 {
        return 0.0;
    }
    (x / max) as f32
}

fn kind_features(event: &Event) -> Vec<f32> {
    let p = &event.payload;
    match event.kind {
        EventKind::Click => {
            let (x, y) = event.position().map(|pos| (pos.x, pos.y)).unwrap_or((0.0, 0.0));
            let w = event
                .attr_f64("viewport_width")
                .unwrap_or(DEFAULT_VIEWPORT_WIDTH);
            let h = event
                .attr_f64("viewport_height")
                .unwrap_or(DEFAULT_VIEWPORT_HEIGHT);
            let selector_len = p.target_selector.as_deref().map_or(0, str::len);
            vec![ratio(x, w), ratio(y, h), squash(selector_len as f64, 50.0)]
        }
        EventKind::Keydown => {
            let key = p.key.as_deref().unwrap_or("");
            let code = match key.chars().next() {
                Some(c) if key.chars().count() == 1 => (c as u32).min(127) as f32 / 127.0,
                Some(_) => (string_hash(key) % 64) as f32 / 63.0,
                None => 0.0,
            };
            vec![
                code,
                squash(key.len() as f64, 5.0),
                p.modifier_keys.len().min(4) as f32 / 4.0,
            ]
        }
        EventKind::TextInput => {
            let len = p.value.as_deref().map_or(0, |v| v.chars().count());
            let method = match event.attr_str("input_method") {
                Some("ime") | Some("composition") => 1.0,
                Some("paste") => 2.0,
                Some("emoji") => 3.0,
                _ => 0.0,
            };
            vec![squash(len as f64, 50.0), method / 3.0]
        }
        EventKind::Scroll => {
            let pct = event.attr_f64("scroll_percentage").unwrap_or(0.0);
            let dir = match event
                .attr_str("scroll_direction")
                .or_else(|| event.attr_str("direction"))
            {
                Some("down") => 1.0,
                Some("up") => 0.0,
                _ => 0.5,
            };
            vec![ratio(pct, 100.0), dir]
        }
        EventKind::MousePattern => vec![
            squash(event.attr_f64("movement_speed").unwrap_or(0.0), 500.0),
            squash(event.attr_f64("direction_changes").unwrap_or(0.0), 5.0),
            squash(event.attr_f64("total_distance").unwrap_or(0.0), 1000.0),
        ],
        EventKind::FormSubmit => vec![squash(
            event.attr_f64("field_count").unwrap_or(0.0),
            5.0,
        )],
        EventKind::FocusChange => {
            let kind = match event
                .attr_str("input_type")
                .or_else(|| event.attr_str("focus_type"))
            {
                Some("email") => 1.0,
                Some("url") => 2.0,
                Some("tel") => 3.0,
                Some("search") => 4.0,
                Some("password") => 5.0,
                Some(_) => 6.0,
                None => 0.0,
            };
            vec![kind / 6.0]
        }
        EventKind::PageVisibility => {
            let visible = match event.attr_str("visibility_state") {
                Some("visible") => 1.0,
                _ => 0.0,
            };
            vec![
                visible,
                squash(event.attr_f64("time_on_page").unwrap_or(0.0), 60_000.0),
            ]
        }
        EventKind::MouseHover => vec![squash(
            event.attr_f64("hover_duration").unwrap_or(0.0),
            1000.0,
        )],
        EventKind::Clipboard => {
            let op = match event.attr_str("operation") {
                Some("copy") => 1.0,
                Some("cut") => 2.0,
                Some("paste") => 3.0,
                _ => 0.0,
            };
            let len = p.value.as_deref().map_or(0, |v| v.chars().count());
            vec![op / 3.0, squash(len as f64, 50.0)]
        }
        EventKind::TabCreated
        | EventKind::TabActivated
        | EventKind::TabUpdated
        | EventKind::TabRemoved => Vec::new(),
    }
}

/// FNV-1a over the bytes; stable across runs, unlike the std hasher.
fn string_hash(s: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x00000100000001B3);
    }
    h
}
