pub mod clicks;
pub mod controller;
pub mod dom;
pub mod hook;
pub mod scroll;

pub use controller::EngagementTracker;
pub use dom::{ClickSignal, DomObserver, ElementInfo, Rect, ScrollMetrics, Size};
pub use hook::TrackingHook;
pub use scroll::ScrollProgress;
