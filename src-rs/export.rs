//! JSON and ZIP exports of the record store.

use crate::error::ExportError;
use crate::record::CaptureRecord;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const ZIP_METADATA_FILE: &str = "records.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMode {
    /// Metadata only.
    Stripped,
    /// Keep each record's `image` data URL.
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Json,
    Zip,
}

impl ExportKind {
    fn extension(self) -> &'static str {
        match self {
            ExportKind::Json => "json",
            ExportKind::Zip => "zip",
        }
    }
}

pub fn export_file_name(kind: ExportKind, at: DateTime<Utc>) -> String {
    format!("xpath-records-{}.{}", at.timestamp_millis(), kind.extension())
}

/// `screenshot-<1-based index>-<id>.png`
pub fn screenshot_filename(index: usize, record: &CaptureRecord) -> String {
    let id: String = record
        .id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!("screenshot-{}-{id}.png", index + 1)
}

fn item_value(record: &CaptureRecord, images: ImageMode) -> Result<Value, ExportError> {
    let mut value = serde_json::to_value(record)?;
    if images == ImageMode::Stripped {
        if let Some(obj) = value.as_object_mut() {
            obj.remove("image");
        }
    }
    Ok(value)
}

pub fn export_json(
    records: &[CaptureRecord],
    images: ImageMode,
    exported_at: DateTime<Utc>,
) -> Result<Vec<u8>, ExportError> {
    if records.is_empty() {
        return Err(ExportError::NothingToExport);
    }
    let items = records
        .iter()
        .map(|record| item_value(record, images))
        .collect::<Result<Vec<_>, _>>()?;
    let document = json!({
        "exportedAt": exported_at.to_rfc3339(),
        "items": items,
    });
    Ok(serde_json::to_vec_pretty(&document)?)
}

pub fn export_zip(
    records: &[CaptureRecord],
    exported_at: DateTime<Utc>,
) -> Result<Vec<u8>, ExportError> {
    if records.is_empty() {
        return Err(ExportError::NothingToExport);
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    // PNG is already compressed
    let png_options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let json_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut items = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let png = record.image_png().ok_or_else(|| ExportError::BadImage {
            id: record.id.clone(),
            reason: "image is not a base64 data URL".to_string(),
        })?;
        let filename = screenshot_filename(index, record);
        zip.start_file(filename.as_str(), png_options)?;
        zip.write_all(&png)?;

        let mut item = item_value(record, ImageMode::Stripped)?;
        if let Some(obj) = item.as_object_mut() {
            obj.insert("screenshotFilename".to_string(), Value::String(filename));
        }
        items.push(item);
    }

    let metadata = json!({
        "exportedAt": exported_at.to_rfc3339(),
        "items": items,
    });
    zip.start_file(ZIP_METADATA_FILE, json_options)?;
    zip.write_all(&serde_json::to_vec_pretty(&metadata)?)?;

    let cursor = zip.finish()?;
    log::debug!("zip export built for {} records", records.len());
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Rect;
    use crate::record::encode_data_url;
    use std::io::Read;
    use zip::ZipArchive;

    fn record(id: &str, png: &[u8]) -> CaptureRecord {
        CaptureRecord {
            id: id.to_string(),
            xpath: format!("//*[@id=\"{id}\"]"),
            css_path: format!("div#{id}"),
            url: "https://example.com/".to_string(),
            title: "Example".to_string(),
            timestamp: Utc::now(),
            rect: Rect::new(1.0, 2.0, 3.0, 4.0),
            device_pixel_ratio: 2.0,
            image: encode_data_url(png),
            cropped: true,
        }
    }

    #[test]
    fn empty_store_has_nothing_to_export() {
        assert!(matches!(
            export_json(&[], ImageMode::Stripped, Utc::now()),
            Err(ExportError::NothingToExport)
        ));
        assert!(matches!(
            export_zip(&[], Utc::now()),
            Err(ExportError::NothingToExport)
        ));
    }

    #[test]
    fn json_export_round_trips_ids_in_order() {
        let records = vec![record("3-c", b"c"), record("1-a", b"a"), record("2-b", b"b")];
        let bytes = export_json(&records, ImageMode::Stripped, Utc::now()).unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();

        assert!(parsed["exportedAt"].as_str().is_some());
        let items = parsed["items"].as_array().unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["3-c", "1-a", "2-b"]);
        assert!(items.iter().all(|i| i.get("image").is_none()));
        assert_eq!(items[0]["cssPath"], Value::from("div#3-c"));
    }

    #[test]
    fn json_export_can_inline_images() {
        let records = vec![record("x", b"png")];
        let bytes = export_json(&records, ImageMode::Inline, Utc::now()).unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            parsed["items"][0]["image"].as_str(),
            Some(records[0].image.as_str())
        );
    }

    #[test]
    fn zip_export_has_one_png_per_record_plus_metadata() {
        let records = vec![record("a1", b"first"), record("b2", b"second")];
        let bytes = export_zip(&records, Utc::now()).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 3);

        let mut png = Vec::new();
        archive
            .by_name("screenshot-2-b2.png")
            .unwrap()
            .read_to_end(&mut png)
            .unwrap();
        assert_eq!(png, b"second");

        let mut raw = String::new();
        archive
            .by_name(ZIP_METADATA_FILE)
            .unwrap()
            .read_to_string(&mut raw)
            .unwrap();
        let meta: Value = serde_json::from_str(&raw).unwrap();
        let items = meta["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["screenshotFilename"], Value::from("screenshot-1-a1.png"));
        assert_eq!(items[1]["id"], Value::from("b2"));
        assert!(items[0].get("image").is_none());
    }

    #[test]
    fn zip_export_rejects_unreadable_images() {
        let mut bad = record("bad", b"");
        bad.image = "https://example.com/not-inline.png".to_string();
        assert!(matches!(
            export_zip(&[bad], Utc::now()),
            Err(ExportError::BadImage { id, .. }) if id == "bad"
        ));
    }

    #[test]
    fn file_names_are_stable() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(export_file_name(ExportKind::Zip, at), "xpath-records-1700000000123.zip");
        assert_eq!(
            screenshot_filename(0, &record("17/x", b"")),
            "screenshot-1-17_x.png"
        );
    }
}
