//! Narrow view of the host page.
//!
//! The tracker never touches a real document. Hosts implement
//! [`DomObserver`] for page facts and push [`ClickSignal`]s and scroll/unload
//! notifications into the tracker.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Page facts the tracker reads while shaping events.
pub trait DomObserver: Send + Sync {
    fn page_url(&self) -> String;
    fn document_title(&self) -> String;
    fn referrer(&self) -> String;
    fn screen_size(&self) -> Size;
    fn viewport_size(&self) -> Size;
    fn user_agent(&self) -> String;
    fn scroll_metrics(&self) -> ScrollMetrics;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    pub scroll_y: f64,
    pub document_height: f64,
    pub viewport_height: f64,
}

/// Viewport-relative bounding box, as reported by the layout engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// True when the whole box lies inside the viewport.
    pub fn fits_within(&self, viewport: Size) -> bool {
        self.top >= 0.0
            && self.left >= 0.0
            && self.bottom() <= f64::from(viewport.height)
            && self.right() <= f64::from(viewport.width)
    }
}

/// Snapshot of one element on a click's propagation path. Every property may
/// be missing on odd markup; the tracker substitutes defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub tag_name: String,
    pub id: Option<String>,
    pub class_name: Option<String>,
    /// Names of attributes present on the element.
    pub attributes: Vec<String>,
    pub text_content: Option<String>,
    pub href: Option<String>,
    pub rect: Rect,
}

impl ElementInfo {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.class_name
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes
            .iter()
            .any(|attr| attr.eq_ignore_ascii_case(name))
    }
}

/// A click observed at document level. `path` runs from the click target up
/// to the document root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClickSignal {
    pub path: Vec<ElementInfo>,
    pub client_x: f64,
    pub client_y: f64,
}

impl ClickSignal {
    pub fn new(path: Vec<ElementInfo>) -> Self {
        Self {
            path,
            client_x: 0.0,
            client_y: 0.0,
        }
    }

    pub fn at(mut self, client_x: f64, client_y: f64) -> Self {
        self.client_x = client_x;
        self.client_y = client_y;
        self
    }
}
