//! The privileged context: a worker thread that owns the viewport source and the record
//! store, and answers typed requests from page agents and the control surface.
//!
//! Every request carries its own reply sender, so one request gets exactly one response.
//! Viewport captures happen on the worker thread in arrival order. Cropping, encoding and the
//! store append for each capture run on a short-lived thread, so back-to-back clicks can
//! overlap; the store's mutex is what keeps their appends from clobbering each other.

use crate::capture::ViewportSource;
use crate::error::{PipelineError, StorageError};
use crate::process::{encode_png, process, OutlineStyle};
use crate::record::{CaptureMeta, CaptureRecord};
use crate::store::{Flag, RecordStore};
use image::RgbaImage;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

#[derive(Debug)]
pub enum CaptureReply {
    Saved {
        id: String,
        cropped: bool,
        count: usize,
    },
    /// Recording is off; nothing was captured.
    Ignored,
    Failed(PipelineError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RecordAdded { id: String, count: usize },
    RecordsCleared,
    RecordingChanged(bool),
}

enum Request {
    Capture {
        meta: CaptureMeta,
        reply: Sender<CaptureReply>,
    },
    SetFlag {
        flag: Flag,
        value: bool,
        reply: Sender<Result<(), StorageError>>,
    },
    GetRecords {
        reply: Sender<Result<Vec<CaptureRecord>, StorageError>>,
    },
    ClearRecords {
        reply: Sender<Result<(), StorageError>>,
    },
    Subscribe {
        events: Sender<Event>,
    },
}

type Subscribers = Arc<Mutex<Vec<Sender<Event>>>>;

struct Background {
    store: Arc<RecordStore>,
    source: Arc<dyn ViewportSource>,
    style: OutlineStyle,
    subscribers: Subscribers,
    workers: Vec<JoinHandle<()>>,
}

pub struct BackgroundHandle {
    tx: Option<Sender<Request>>,
    thread: Option<JoinHandle<()>>,
}

impl BackgroundHandle {
    pub fn spawn(
        store: Arc<RecordStore>,
        source: Arc<dyn ViewportSource>,
        style: OutlineStyle,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let background = Background {
            store,
            source,
            style,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            workers: Vec::new(),
        };
        let thread = thread::Builder::new()
            .name("capture-background".into())
            .spawn(move || background.run(rx))?;
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    fn send(&self, request: Request) -> Result<(), PipelineError> {
        self.tx
            .as_ref()
            .ok_or(PipelineError::Disconnected)?
            .send(request)
            .map_err(|_| PipelineError::Disconnected)
    }

    /// Queues a capture and returns the receiver its single reply will arrive on.
    pub fn submit_capture(&self, meta: CaptureMeta) -> Receiver<CaptureReply> {
        let (reply, rx) = mpsc::channel();
        if let Err(err) = self.send(Request::Capture {
            meta,
            reply: reply.clone(),
        }) {
            let _ = reply.send(CaptureReply::Failed(err));
        }
        rx
    }

    pub fn request_capture(&self, meta: CaptureMeta) -> CaptureReply {
        self.submit_capture(meta)
            .recv()
            .unwrap_or(CaptureReply::Failed(PipelineError::Disconnected))
    }

    pub fn set_recording(&self, active: bool) -> Result<(), PipelineError> {
        self.set_flag(Flag::RecordingActive, active)
    }

    pub fn set_cropping(&self, enabled: bool) -> Result<(), PipelineError> {
        self.set_flag(Flag::CroppingEnabled, enabled)
    }

    fn set_flag(&self, flag: Flag, value: bool) -> Result<(), PipelineError> {
        let (reply, rx) = mpsc::channel();
        self.send(Request::SetFlag { flag, value, reply })?;
        Ok(rx.recv().map_err(|_| PipelineError::Disconnected)??)
    }

    pub fn get_records(&self) -> Result<Vec<CaptureRecord>, PipelineError> {
        let (reply, rx) = mpsc::channel();
        self.send(Request::GetRecords { reply })?;
        Ok(rx.recv().map_err(|_| PipelineError::Disconnected)??)
    }

    pub fn clear_records(&self) -> Result<(), PipelineError> {
        let (reply, rx) = mpsc::channel();
        self.send(Request::ClearRecords { reply })?;
        Ok(rx.recv().map_err(|_| PipelineError::Disconnected)??)
    }

    pub fn subscribe(&self) -> Result<Receiver<Event>, PipelineError> {
        let (events, rx) = mpsc::channel();
        self.send(Request::Subscribe { events })?;
        Ok(rx)
    }

    /// Stops accepting requests and waits for in-flight captures to be stored.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for BackgroundHandle {
    fn drop(&mut self) {
        // closing the channel ends the worker loop
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if let Err(err) = thread.join() {
                log::error!("background context panicked: {err:?}");
            }
        }
    }
}

impl Background {
    fn run(mut self, rx: Receiver<Request>) {
        log::debug!("background context started");
        for request in rx {
            match request {
                Request::Capture { meta, reply } => self.handle_capture(meta, reply),
                Request::SetFlag { flag, value, reply } => {
                    let result = self.store.set_flag(flag, value);
                    if result.is_ok() {
                        log::info!("{} set to {value}", flag.key());
                        if flag == Flag::RecordingActive {
                            broadcast(&self.subscribers, Event::RecordingChanged(value));
                        }
                    }
                    let _ = reply.send(result);
                }
                Request::GetRecords { reply } => {
                    let _ = reply.send(self.store.list_all());
                }
                Request::ClearRecords { reply } => {
                    let result = self.store.clear();
                    if result.is_ok() {
                        log::info!("records cleared");
                        broadcast(&self.subscribers, Event::RecordsCleared);
                    }
                    let _ = reply.send(result);
                }
                Request::Subscribe { events } => {
                    if let Ok(mut subs) = self.subscribers.lock() {
                        subs.push(events);
                    }
                }
            }
            self.workers.retain(|worker| !worker.is_finished());
        }

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        log::debug!("background context stopped");
    }

    fn handle_capture(&mut self, meta: CaptureMeta, reply: Sender<CaptureReply>) {
        // one read of both flags for this capture
        let session = match self.store.session() {
            Ok(session) => session,
            Err(err) => {
                log::warn!("capture skipped, session unreadable: {err}");
                let _ = reply.send(CaptureReply::Failed(err.into()));
                return;
            }
        };
        if !session.recording_active {
            let _ = reply.send(CaptureReply::Ignored);
            return;
        }

        let bitmap = match self.source.capture_viewport(meta.window) {
            Ok(bitmap) => bitmap,
            Err(err) => {
                log::warn!("capture failed for {}: {err}", meta.css_path);
                let _ = reply.send(CaptureReply::Failed(err.into()));
                return;
            }
        };

        let store = Arc::clone(&self.store);
        let subscribers = Arc::clone(&self.subscribers);
        let style = self.style;
        let crop = session.cropping_enabled;
        let worker = thread::spawn(move || {
            let outcome = match persist(&store, &bitmap, meta, crop, &style) {
                Ok((id, cropped, count)) => {
                    log::info!("record {id} saved ({count} total, cropped={cropped})");
                    broadcast(
                        &subscribers,
                        Event::RecordAdded {
                            id: id.clone(),
                            count,
                        },
                    );
                    CaptureReply::Saved { id, cropped, count }
                }
                Err(err) => {
                    log::warn!("record dropped: {err}");
                    CaptureReply::Failed(err)
                }
            };
            let _ = reply.send(outcome);
        });
        self.workers.push(worker);
    }
}

fn persist(
    store: &RecordStore,
    bitmap: &RgbaImage,
    meta: CaptureMeta,
    crop: bool,
    style: &OutlineStyle,
) -> Result<(String, bool, usize), PipelineError> {
    let processed = process(
        bitmap,
        meta.rect,
        meta.scroll,
        meta.device_pixel_ratio,
        crop,
        style,
    );
    let png = encode_png(&processed.image)?;
    let record = CaptureRecord::from_meta(meta, &png, processed.cropped);
    let id = record.id.clone();
    let count = store.append(record)?;
    Ok((id, processed.cropped, count))
}

fn broadcast(subscribers: &Subscribers, event: Event) {
    if let Ok(mut subs) = subscribers.lock() {
        subs.retain(|sub| sub.send(event.clone()).is_ok());
    }
}
