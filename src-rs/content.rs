//! Page-side click handling. Everything that depends on the page (selectors, element rect,
//! scroll offset, DPR) is read synchronously when the click is handled and shipped with the
//! single capture request, so the crop never depends on where the page has scrolled since.

use crate::background::{BackgroundHandle, CaptureReply};
use crate::dom::{NodeId, Page};
use crate::record::{CaptureMeta, WindowId};
use crate::selector::compute_selectors;
use chrono::Utc;

pub struct PageAgent<'a> {
    page: &'a Page,
    window: WindowId,
    background: &'a BackgroundHandle,
}

impl<'a> PageAgent<'a> {
    pub fn new(page: &'a Page, window: WindowId, background: &'a BackgroundHandle) -> Self {
        Self {
            page,
            window,
            background,
        }
    }

    pub fn capture_meta(&self, node: NodeId) -> CaptureMeta {
        let selectors = compute_selectors(&self.page.document, node);
        CaptureMeta {
            window: self.window,
            xpath: selectors.xpath,
            css_path: selectors.css_path,
            url: self.page.url.clone(),
            title: self.page.title.clone(),
            timestamp: Utc::now(),
            rect: self.page.document.element(node).rect,
            scroll: self.page.scroll,
            device_pixel_ratio: self.page.device_pixel_ratio,
        }
    }

    /// Handles one click and waits for the background's single reply.
    pub fn click(&self, node: NodeId) -> CaptureReply {
        let meta = self.capture_meta(node);
        log::debug!("click on {} at scroll {:?}", meta.css_path, meta.scroll);
        self.background.request_capture(meta)
    }
}
