use crate::process::OutlineStyle;
use image::Rgba;
use std::path::PathBuf;
use std::time::Duration;

pub const DATA_DIR_ENV: &str = "ELEMCAP_DATA_DIR";
pub const EXPORT_DIR_ENV: &str = "ELEMCAP_EXPORT_DIR";
pub const OUTLINE_COLOR_ENV: &str = "ELEMCAP_OUTLINE_COLOR";

const DEFAULT_DATA_DIR: &str = ".element-capture";
const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub export_dir: PathBuf,
    pub capture_timeout: Duration,
    pub outline: OutlineStyle,
}

impl Config {
    /// CLI flags win over environment variables, which win over defaults.
    pub fn resolve(
        data_dir: Option<PathBuf>,
        export_dir: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let env_path = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        };

        let data_dir = data_dir
            .or_else(|| env_path(DATA_DIR_ENV))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let export_dir = export_dir
            .or_else(|| env_path(EXPORT_DIR_ENV))
            .unwrap_or_else(|| data_dir.join("exports"));

        let mut outline = OutlineStyle::default();
        if let Some(raw) = lookup(OUTLINE_COLOR_ENV) {
            match parse_hex_color(&raw) {
                Some(color) => outline.color = color,
                None => log::warn!("ignoring {OUTLINE_COLOR_ENV}={raw:?}: expected #RRGGBB or #RRGGBBAA"),
            }
        }

        Self {
            data_dir,
            export_dir,
            capture_timeout: Duration::from_millis(DEFAULT_CAPTURE_TIMEOUT_MS),
            outline,
        }
    }

    pub fn from_env(data_dir: Option<PathBuf>, export_dir: Option<PathBuf>) -> Self {
        Self::resolve(data_dir, export_dir, |key| std::env::var(key).ok())
    }
}

pub fn parse_hex_color(raw: &str) -> Option<Rgba<u8>> {
    let hex = raw.trim().strip_prefix('#')?;
    if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Some(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}
