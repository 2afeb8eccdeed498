//! Page model: an arena-backed element tree plus the viewport state of the page it was
//! taken from.
//!
//! Snapshot JSON shape:
//!
//! ```json
//! {
//!   "url": "https://example.com/",
//!   "title": "Example",
//!   "scroll": {"x": 0, "y": 120},
//!   "devicePixelRatio": 2,
//!   "root": {"tag": "html", "children": [
//!     {"tag": "body", "children": [
//!       {"tag": "div", "id": "foo", "rect": {"left": 100, "top": 200, "width": 50, "height": 20}}
//!     ]}
//!   ]}
//! }
//! ```
//!
//! Rects are page-relative CSS pixels (relative to the whole scrollable document).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

#[cfg(test)]
impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub rect: Rect,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Element {
    /// The `id` attribute, ignoring empty values.
    pub fn identifier(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Element>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached element. Attach it with [`Document::append_child`].
    pub fn create_element(&mut self, tag: &str, id: Option<&str>, rect: Rect) -> NodeId {
        let node = NodeId(self.nodes.len());
        self.nodes.push(Element {
            tag: tag.to_ascii_lowercase(),
            id: id.map(ToString::to_string),
            rect,
            parent: None,
            children: Vec::new(),
        });
        node
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn element(&self, node: NodeId) -> &Element {
        &self.nodes[node.0]
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Element siblings that come before `node` under the same parent, nearest last.
    pub fn preceding_siblings(&self, node: NodeId) -> &[NodeId] {
        match self.parent(node) {
            Some(parent) => {
                let siblings = self.children(parent);
                let pos = siblings.iter().position(|&s| s == node).unwrap_or(0);
                &siblings[..pos]
            }
            None => &[],
        }
    }

    /// 1-based position of `node` among siblings sharing its tag.
    pub fn ordinal_of_type(&self, node: NodeId) -> usize {
        let tag = &self.element(node).tag;
        1 + self
            .preceding_siblings(node)
            .iter()
            .filter(|&&s| self.element(s).tag == *tag)
            .count()
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|el| el.identifier() == Some(id))
            .map(NodeId)
    }

    /// Node at a given index in document (pre-order) order for loaded snapshots.
    pub fn node(&self, index: usize) -> Option<NodeId> {
        (index < self.nodes.len()).then_some(NodeId(index))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// A loaded page snapshot: the element tree plus viewport state that the page agent reads
/// when a click happens.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub scroll: ScrollOffset,
    pub device_pixel_ratio: f64,
    pub document: Document,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageSnapshot {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    scroll: ScrollOffset,
    #[serde(default = "default_dpr")]
    device_pixel_ratio: f64,
    root: RawElement,
}

#[derive(Debug, Deserialize)]
struct RawElement {
    tag: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    rect: Rect,
    #[serde(default)]
    children: Vec<RawElement>,
}

fn default_dpr() -> f64 {
    1.0
}

impl Page {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read page snapshot: {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("invalid page snapshot: {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let snapshot: PageSnapshot = serde_json::from_str(raw)?;
        if !snapshot.device_pixel_ratio.is_finite() || snapshot.device_pixel_ratio <= 0.0 {
            bail!(
                "devicePixelRatio must be positive, got {}",
                snapshot.device_pixel_ratio
            );
        }

        let mut document = Document::new();
        let mut stack: Vec<(Option<NodeId>, &RawElement)> = vec![(None, &snapshot.root)];
        while let Some((parent, raw)) = stack.pop() {
            if raw.rect.width < 0.0 || raw.rect.height < 0.0 {
                bail!(
                    "element <{}> has a negative size {}x{}",
                    raw.tag,
                    raw.rect.width,
                    raw.rect.height
                );
            }
            let node = document.create_element(&raw.tag, raw.id.as_deref(), raw.rect);
            if let Some(parent) = parent {
                document.append_child(parent, node);
            }
            // reversed so the first child is created next (pre-order indices)
            for child in raw.children.iter().rev() {
                stack.push((Some(node), child));
            }
        }

        Ok(Self {
            url: snapshot.url,
            title: snapshot.title,
            scroll: snapshot.scroll,
            device_pixel_ratio: snapshot.device_pixel_ratio,
            document,
        })
    }

    pub fn scroll_to(&mut self, x: f64, y: f64) {
        self.scroll = ScrollOffset { x, y };
    }
}
