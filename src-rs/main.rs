mod background;
mod capture;
mod config;
mod content;
mod dom;
mod error;
mod export;
mod process;
mod record;
mod selector;
mod store;

use anyhow::{bail, Context, Result};
use background::{BackgroundHandle, CaptureReply, Event};
use capture::{FileViewportSource, ScreenViewportSource, ViewportSource};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use config::Config;
use content::PageAgent;
use dom::Page;
use error::ExportError;
use export::{export_file_name, export_json, export_zip, ExportKind, ImageMode};
use record::{CaptureRecord, WindowId};
use serde_json::{json, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use store::{Flag, RecordStore};

#[derive(Parser, Debug)]
#[command(
    name = "element-capture",
    version,
    about = "Record clicked page elements as cropped or outlined screenshots and export them"
)]
struct Cli {
    /// Directory holding the record store (default: $ELEMCAP_DATA_DIR or .element-capture)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Directory for exports (default: $ELEMCAP_EXPORT_DIR or <data-dir>/exports)
    #[arg(long, global = true)]
    export_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Start recording clicks
    Start,
    /// Stop recording clicks
    Stop,
    /// Show recording state, crop mode and item count
    Status(StatusArgs),
    /// Switch between cropping to the element and outlining it on the full viewport
    /// (flips the current mode when no mode is given)
    Crop(CropArgs),
    /// Click an element of a page snapshot and capture it
    Click(ClickArgs),
    /// List captured records
    List(ListArgs),
    /// Delete every captured record
    Clear,
    /// Export records as a JSON document
    #[command(name = "export-json")]
    ExportJson(ExportJsonArgs),
    /// Export records as a ZIP of PNGs plus records.json
    #[command(name = "export-zip")]
    ExportZip(ExportZipArgs),
}

#[derive(Args, Debug)]
struct StatusArgs {
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Args, Debug)]
struct CropArgs {
    #[arg(value_enum)]
    mode: Option<Toggle>,
}

#[derive(Args, Debug)]
struct ClickArgs {
    /// Page snapshot JSON (element tree, scroll offset, devicePixelRatio)
    #[arg(long)]
    page: PathBuf,
    /// Target the element with this id attribute
    #[arg(long, conflicts_with = "node")]
    id: Option<String>,
    /// Target the element at this document-order index
    #[arg(long)]
    node: Option<usize>,
    /// Horizontal scroll offset at click time (default: the snapshot's)
    #[arg(long)]
    scroll_x: Option<f64>,
    /// Vertical scroll offset at click time (default: the snapshot's)
    #[arg(long)]
    scroll_y: Option<f64>,
    /// PNG standing in for the visible viewport (default: capture the screen)
    #[arg(long)]
    screenshot: Option<PathBuf>,
    /// Window the click came from
    #[arg(long, default_value_t = 0)]
    window: u32,
    /// Print the outcome as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args, Debug)]
struct ExportJsonArgs {
    /// Output path (default: <export-dir>/xpath-records-<ms>.json)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Embed each image as a data URL
    #[arg(long, action = ArgAction::SetTrue)]
    with_images: bool,
}

#[derive(Args, Debug)]
struct ExportZipArgs {
    /// Output path (default: <export-dir>/xpath-records-<ms>.zip)
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env(cli.data_dir.clone(), cli.export_dir.clone());

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::Start => command_set_recording(&config, true),
        Commands::Stop => command_set_recording(&config, false),
        Commands::Status(args) => command_status(&config, args),
        Commands::Crop(args) => command_crop(&config, args),
        Commands::Click(args) => command_click(&config, args),
        Commands::List(args) => command_list(&config, args),
        Commands::Clear => command_clear(&config),
        Commands::ExportJson(args) => command_export_json(&config, args),
        Commands::ExportZip(args) => command_export_zip(&config, args),
    }
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({"name": "start", "description": "Start recording clicks."}),
        json!({"name": "stop", "description": "Stop recording clicks."}),
        json!({"name": "status", "description": "Show recording state, crop mode and item count."}),
        json!({"name": "crop", "description": "Set crop (on) or full-viewport outline (off) mode, or flip it."}),
        json!({"name": "click", "description": "Click an element of a page snapshot and capture it."}),
        json!({"name": "list", "description": "List captured records."}),
        json!({"name": "clear", "description": "Delete every captured record."}),
        json!({"name": "export-json", "description": "Export metadata (optionally images) as JSON."}),
        json!({"name": "export-zip", "description": "Export PNGs plus records.json as a ZIP."}),
    ];

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "commands": rows }))?
    );
    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<RecordStore>> {
    let store = RecordStore::open(&config.data_dir).with_context(|| {
        format!(
            "failed to open record store: {}",
            config.data_dir.display()
        )
    })?;
    Ok(Arc::new(store))
}

fn spawn_background(config: &Config, source: Arc<dyn ViewportSource>) -> Result<BackgroundHandle> {
    let store = open_store(config)?;
    BackgroundHandle::spawn(store, source, config.outline)
        .context("failed to start background context")
}

fn screen_source(config: &Config) -> Arc<dyn ViewportSource> {
    Arc::new(ScreenViewportSource::new(config.capture_timeout))
}

fn load_records(config: &Config) -> Result<Vec<CaptureRecord>> {
    let bg = spawn_background(config, screen_source(config))?;
    let records = bg.get_records().context("failed to read records");
    bg.shutdown();
    records
}

fn toast(message: &str) {
    println!("{message}");
}

/// Popup lines for the events broadcast while one command ran.
fn live_updates(events: &Receiver<Event>) -> Vec<String> {
    events
        .try_iter()
        .map(|event| match event {
            Event::RecordAdded { count, .. } => format!("Items: {count}"),
            Event::RecordsCleared => "Items: 0".to_string(),
            Event::RecordingChanged(true) => format!("Badge: {}", badge_text(true)),
            Event::RecordingChanged(false) => "Badge cleared".to_string(),
        })
        .collect()
}

fn badge_text(recording: bool) -> &'static str {
    if recording {
        "REC"
    } else {
        ""
    }
}

fn command_set_recording(config: &Config, active: bool) -> Result<()> {
    let bg = spawn_background(config, screen_source(config))?;
    let events = bg.subscribe()?;
    bg.set_recording(active)
        .context("failed to update recording state")?;
    bg.shutdown();
    toast(if active {
        "Recording started"
    } else {
        "Recording stopped"
    });
    for line in live_updates(&events) {
        toast(&line);
    }
    Ok(())
}

fn command_status(config: &Config, args: StatusArgs) -> Result<()> {
    let store = open_store(config)?;
    let session = store.session().context("failed to read session state")?;
    let items = store.count().context("failed to count records")?;

    if args.json {
        let payload = json!({
            "recordingActive": session.recording_active,
            "croppingEnabled": session.cropping_enabled,
            "items": items,
            "badge": badge_text(session.recording_active),
            "storagePath": abs_path(store.path()).display().to_string(),
        });
        println!("{}", serde_json::to_string(&payload)?);
    } else {
        let state = if session.recording_active {
            "Recording…"
        } else {
            "Not Recording"
        };
        let crop = if session.cropping_enabled { "on" } else { "off" };
        println!("{state} | crop: {crop} | Items: {items}");
    }
    Ok(())
}

fn command_crop(config: &Config, args: CropArgs) -> Result<()> {
    let enabled = match args.mode {
        Some(mode) => mode == Toggle::On,
        None => {
            let store = open_store(config)?;
            !store
                .get_flag(Flag::CroppingEnabled)
                .context("failed to read crop mode")?
        }
    };
    let bg = spawn_background(config, screen_source(config))?;
    bg.set_cropping(enabled)
        .context("failed to update crop mode")?;
    bg.shutdown();
    toast(if enabled {
        "Cropping enabled"
    } else {
        "Cropping disabled"
    });
    Ok(())
}

fn command_click(config: &Config, args: ClickArgs) -> Result<()> {
    let mut page = Page::load(&args.page)?;
    if args.scroll_x.is_some() || args.scroll_y.is_some() {
        let x = args.scroll_x.unwrap_or(page.scroll.x);
        let y = args.scroll_y.unwrap_or(page.scroll.y);
        page.scroll_to(x, y);
    }
    let node = match (&args.id, args.node) {
        (Some(id), _) => page
            .document
            .find_by_id(id)
            .with_context(|| format!("no element with id {id:?} in {}", args.page.display()))?,
        (None, Some(index)) => page.document.node(index).with_context(|| {
            format!(
                "node index {index} out of range ({} elements)",
                page.document.len()
            )
        })?,
        (None, None) => bail!("pass --id or --node to choose the clicked element"),
    };

    let source: Arc<dyn ViewportSource> = match &args.screenshot {
        Some(path) => {
            if !path.exists() {
                bail!("screenshot not found: {}", path.display());
            }
            Arc::new(FileViewportSource::new(path))
        }
        None => screen_source(config),
    };

    let css_path = selector::css_path(&page.document, node);
    let bg = spawn_background(config, source)?;
    let events = bg.subscribe()?;
    let reply = PageAgent::new(&page, WindowId(args.window), &bg).click(node);
    bg.shutdown();

    let payload = match &reply {
        CaptureReply::Saved { id, cropped, count } => json!({
            "status": "saved",
            "id": id,
            "cropped": cropped,
            "items": count,
            "cssPath": css_path,
        }),
        CaptureReply::Ignored => json!({"status": "ignored", "cssPath": css_path}),
        CaptureReply::Failed(err) => json!({
            "status": "failed",
            "error": err.to_string(),
            "cssPath": css_path,
        }),
    };

    if args.json {
        println!("{}", serde_json::to_string(&payload)?);
        return Ok(());
    }
    match reply {
        CaptureReply::Saved { id, cropped, .. } => {
            let mode = if cropped { "cropped" } else { "outlined" };
            toast(&format!("Captured {css_path} ({mode}, id {id})"));
        }
        CaptureReply::Ignored => toast("Not recording; click ignored"),
        CaptureReply::Failed(err) => eprintln!("warning: click on {css_path} not recorded: {err}"),
    }
    for line in live_updates(&events) {
        toast(&line);
    }
    Ok(())
}

fn command_list(config: &Config, args: ListArgs) -> Result<()> {
    let records = load_records(config)?;

    if args.json {
        let items: Vec<Value> = records
            .iter()
            .map(|record| -> Result<Value> {
                let mut value = serde_json::to_value(record)?;
                if let Some(obj) = value.as_object_mut() {
                    obj.remove("image");
                }
                Ok(value)
            })
            .collect::<Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&json!({ "items": items }))?);
        return Ok(());
    }

    if records.is_empty() {
        toast("Items: 0");
        return Ok(());
    }
    for (index, record) in records.iter().enumerate() {
        println!(
            "{:>3}. {}  {}  {}{}",
            index + 1,
            record.id,
            record.css_path,
            record.url,
            if record.cropped { "" } else { "  (outline)" }
        );
    }
    Ok(())
}

fn command_clear(config: &Config) -> Result<()> {
    let bg = spawn_background(config, screen_source(config))?;
    let events = bg.subscribe()?;
    let result = bg.clear_records();
    bg.shutdown();
    match result {
        Ok(()) => toast("Records cleared"),
        Err(err) => bail!("Failed to clear: {err}"),
    }
    for line in live_updates(&events) {
        toast(&line);
    }
    Ok(())
}

fn command_export_json(config: &Config, args: ExportJsonArgs) -> Result<()> {
    let records = load_records(config)?;
    let images = if args.with_images {
        ImageMode::Inline
    } else {
        ImageMode::Stripped
    };

    let now = Utc::now();
    let bytes = match export_json(&records, images, now) {
        Ok(bytes) => bytes,
        Err(ExportError::NothingToExport) => {
            toast("No items to download");
            return Ok(());
        }
        Err(err) => return Err(err).context("JSON export failed"),
    };

    let out = args
        .out
        .unwrap_or_else(|| config.export_dir.join(export_file_name(ExportKind::Json, now)));
    write_bytes(&out, &bytes)?;
    log::info!("exported {} records to {}", records.len(), out.display());
    println!("{}", abs_path(&out).display());
    Ok(())
}

fn command_export_zip(config: &Config, args: ExportZipArgs) -> Result<()> {
    let records = load_records(config)?;

    let now = Utc::now();
    let bytes = match export_zip(&records, now) {
        Ok(bytes) => bytes,
        Err(ExportError::NothingToExport) => {
            toast("No items to download");
            return Ok(());
        }
        Err(err) => return Err(err).context("ZIP generation failed"),
    };

    let out = args
        .out
        .unwrap_or_else(|| config.export_dir.join(export_file_name(ExportKind::Zip, now)));
    write_bytes(&out, &bytes)?;
    log::info!("exported {} records to {}", records.len(), out.display());
    println!("{}", abs_path(&out).display());
    Ok(())
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;
    fs::write(path, bytes).with_context(|| format!("failed to write export: {}", path.display()))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}
