use super::dom::ScrollMetrics;

/// Scroll depth in whole percent, clamped to `0..=100`.
///
/// Returns `None` when the content does not overflow the viewport: there is
/// no depth to measure on such pages.
pub fn scroll_percent(metrics: &ScrollMetrics) -> Option<u32> {
    let scrollable = metrics.document_height - metrics.viewport_height;
    if !scrollable.is_finite() || scrollable <= 0.0 || !metrics.scroll_y.is_finite() {
        return None;
    }
    let percent = (metrics.scroll_y / scrollable * 100.0).round();
    Some(percent.clamp(0.0, 100.0) as u32)
}

/// Highest milestone reached during one page view.
#[derive(Debug, Clone)]
pub struct ScrollProgress {
    max: u32,
    milestones: Vec<u32>,
}

impl ScrollProgress {
    /// `milestones` must be ascending.
    pub fn new(milestones: Vec<u32>) -> Self {
        Self { max: 0, milestones }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Milestones newly crossed by `percent`, ascending. A fast scroll that
    /// skips past several thresholds reports each of them once.
    pub fn observe(&mut self, percent: u32) -> Vec<u32> {
        let mut crossed = Vec::new();
        for &threshold in &self.milestones {
            if percent >= threshold && self.max < threshold {
                crossed.push(threshold);
                self.max = threshold;
            }
        }
        crossed
    }
}
