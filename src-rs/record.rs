use crate::dom::{Rect, ScrollOffset};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Opaque handle of the browser window a capture request came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowId(pub u32);

/// Everything the page knows about a click, sampled in one go when the click is handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMeta {
    pub window: WindowId,
    pub xpath: String,
    pub css_path: String,
    pub url: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub rect: Rect,
    pub scroll: ScrollOffset,
    pub device_pixel_ratio: f64,
}

/// One persisted capture. Never mutated after it is appended to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    pub id: String,
    pub xpath: String,
    pub css_path: String,
    pub url: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub rect: Rect,
    pub device_pixel_ratio: f64,
    /// PNG as a `data:` URL.
    pub image: String,
    pub cropped: bool,
}

impl CaptureRecord {
    pub fn from_meta(meta: CaptureMeta, png: &[u8], cropped: bool) -> Self {
        Self {
            id: new_record_id(meta.timestamp),
            xpath: meta.xpath,
            css_path: meta.css_path,
            url: meta.url,
            title: meta.title,
            timestamp: meta.timestamp,
            rect: meta.rect,
            device_pixel_ratio: meta.device_pixel_ratio,
            image: encode_data_url(png),
            cropped,
        }
    }

    pub fn image_png(&self) -> Option<Vec<u8>> {
        decode_data_url(&self.image)
    }
}

/// `<epoch ms>-<8 hex chars>`
pub fn new_record_id(at: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}-{suffix:08x}", at.timestamp_millis())
}

pub fn encode_data_url(png: &[u8]) -> String {
    format!("{PNG_DATA_URL_PREFIX}{}", STANDARD.encode(png))
}

pub fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    let (header, payload) = url.split_once(',')?;
    if !header.starts_with("data:") || !header.ends_with(";base64") {
        return None;
    }
    STANDARD.decode(payload.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn meta() -> CaptureMeta {
        CaptureMeta {
            window: WindowId(1),
            xpath: "//*[@id=\"foo\"]".to_string(),
            css_path: "div#foo".to_string(),
            url: "https://example.com/".to_string(),
            title: "Example".to_string(),
            timestamp: Utc::now(),
            rect: Rect::new(100.0, 200.0, 50.0, 20.0),
            scroll: ScrollOffset::default(),
            device_pixel_ratio: 2.0,
        }
    }

    #[test]
    fn ids_carry_timestamp_and_differ() {
        let now = Utc::now();
        let a = new_record_id(now);
        let b = new_record_id(now);
        assert!(a.starts_with(&now.timestamp_millis().to_string()));
        assert_eq!(a.len(), b.len());
        assert_ne!(a, b);
    }

    #[test]
    fn record_serializes_with_camel_case_keys() {
        let record = CaptureRecord::from_meta(meta(), &[1, 2, 3], true);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["cssPath"], Value::from("div#foo"));
        assert_eq!(value["devicePixelRatio"], Value::from(2.0));
        assert_eq!(value["rect"]["width"], Value::from(50.0));
        assert!(value["image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn data_url_decodes_payload() {
        let record = CaptureRecord::from_meta(meta(), b"\x89PNG", false);
        assert_eq!(record.image_png().unwrap(), b"\x89PNG".to_vec());
        assert_eq!(decode_data_url("not a data url"), None);
        assert_eq!(decode_data_url("data:text/plain,hello"), None);
    }
}
