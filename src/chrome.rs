use eframe::egui::{self, Pos2, Rect, Vec2};

/// Vertical space taken by the header, controls and instructions.
const CHROME_OVERHEAD: f32 = 220.0;
const MIN_IMAGE_AREA_HEIGHT: f32 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelLimits {
    pub min: Vec2,
    pub max: Vec2,
    pub compact_cap: Vec2,
    pub compact_fraction: f32,
    pub fullscreen_fraction: f32,
}

impl Default for PanelLimits {
    fn default() -> Self {
        Self {
            min: egui::vec2(400.0, 300.0),
            max: egui::vec2(1630.5, 930.5),
            compact_cap: egui::vec2(1600.0, 1000.0),
            compact_fraction: 0.85,
            fullscreen_fraction: 0.98,
        }
    }
}

impl PanelLimits {
    pub fn clamp(&self, size: Vec2) -> Vec2 {
        egui::vec2(
            size.x.min(self.max.x).max(self.min.x),
            size.y.min(self.max.y).max(self.min.y),
        )
    }

    pub fn compact_size(&self, viewing_area: Vec2) -> Vec2 {
        self.clamp((viewing_area * self.compact_fraction).min(self.compact_cap))
    }

    pub fn fullscreen_size(&self, viewing_area: Vec2) -> Vec2 {
        self.clamp((viewing_area * self.fullscreen_fraction).min(self.max))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResizeHandle {
    Corner,
    Right,
    Bottom,
}

impl ResizeHandle {
    pub const ALL: [ResizeHandle; 3] = [Self::Corner, Self::Right, Self::Bottom];

    pub fn cursor(self) -> egui::CursorIcon {
        match self {
            Self::Corner => egui::CursorIcon::ResizeNwSe,
            Self::Right => egui::CursorIcon::ResizeHorizontal,
            Self::Bottom => egui::CursorIcon::ResizeVertical,
        }
    }

    pub fn rect(self, panel: Rect) -> Rect {
        match self {
            Self::Corner => Rect::from_min_max(panel.max - egui::vec2(20.0, 20.0), panel.max),
            Self::Right => Rect::from_center_size(
                egui::pos2(panel.right() - 4.0, panel.center().y),
                egui::vec2(8.0, 60.0),
            ),
            Self::Bottom => Rect::from_center_size(
                egui::pos2(panel.center().x, panel.bottom() - 4.0),
                egui::vec2(60.0, 8.0),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResizeDrag {
    handle: ResizeHandle,
    origin: Pos2,
    start_size: Vec2,
}

#[derive(Debug, Clone)]
pub struct PanelChrome {
    limits: PanelLimits,
    size: Vec2,
    fullscreen: bool,
    restore_size: Option<Vec2>,
    drag: Option<ResizeDrag>,
}

impl PanelChrome {
    pub fn new(limits: PanelLimits, viewing_area: Vec2) -> Self {
        Self {
            limits,
            size: limits.compact_size(viewing_area),
            fullscreen: false,
            restore_size: None,
            drag: None,
        }
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn is_resizing(&self) -> bool {
        self.drag.is_some()
    }

    pub fn active_handle(&self) -> Option<ResizeHandle> {
        self.drag.map(|drag| drag.handle)
    }

    pub fn image_area_height(&self) -> f32 {
        (self.size.y - CHROME_OVERHEAD).max(MIN_IMAGE_AREA_HEIGHT)
    }

    pub fn panel_rect(&self, screen: Rect) -> Rect {
        Rect::from_center_size(screen.center(), self.size)
    }

    pub fn toggle_fullscreen(&mut self, viewing_area: Vec2) {
        if self.fullscreen {
            self.size = self
                .restore_size
                .take()
                .unwrap_or_else(|| self.limits.compact_size(viewing_area));
        } else {
            self.restore_size = Some(self.size);
            self.size = self.limits.fullscreen_size(viewing_area);
        }
        self.fullscreen = !self.fullscreen;
    }

    pub fn begin_resize(&mut self, handle: ResizeHandle, pointer: Pos2) {
        self.drag = Some(ResizeDrag {
            handle,
            origin: pointer,
            start_size: self.size,
        });
    }

    pub fn drag_to(&mut self, pointer: Pos2) {
        let Some(drag) = self.drag else {
            return;
        };
        let delta = pointer - drag.origin;
        let mut size = drag.start_size;
        if matches!(drag.handle, ResizeHandle::Corner | ResizeHandle::Right) {
            size.x += delta.x;
        }
        if matches!(drag.handle, ResizeHandle::Corner | ResizeHandle::Bottom) {
            size.y += delta.y;
        }
        self.size = self.limits.clamp(size);
    }

    pub fn end_resize(&mut self) {
        self.drag = None;
    }
}

pub fn press_closes_panel(panel: Rect, press: Pos2) -> bool {
    !panel.contains(press)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> Vec2 {
        egui::vec2(1920.0, 1080.0)
    }

    fn assert_close(actual: Vec2, expected: Vec2) {
        assert!((actual - expected).length() < 0.01, "{actual:?} != {expected:?}");
    }

    #[test]
    fn compact_size_is_a_fraction_of_the_screen_within_limits() {
        let chrome = PanelChrome::new(PanelLimits::default(), screen());
        assert_close(chrome.size(), egui::vec2(1600.0, 918.0));

        let small = PanelChrome::new(PanelLimits::default(), egui::vec2(300.0, 200.0));
        assert_eq!(small.size(), egui::vec2(400.0, 300.0));
    }

    #[test]
    fn fullscreen_size_respects_absolute_maximum() {
        let mut chrome = PanelChrome::new(PanelLimits::default(), screen());
        chrome.toggle_fullscreen(screen());
        assert!(chrome.is_fullscreen());
        assert_eq!(chrome.size(), egui::vec2(1630.5, 930.5));
    }

    #[test]
    fn toggling_fullscreen_twice_restores_size() {
        let mut chrome = PanelChrome::new(PanelLimits::default(), screen());
        chrome.begin_resize(ResizeHandle::Corner, egui::pos2(100.0, 100.0));
        chrome.drag_to(egui::pos2(-400.0, -200.0));
        chrome.end_resize();
        let before = chrome.size();

        chrome.toggle_fullscreen(screen());
        chrome.toggle_fullscreen(screen());
        assert!(!chrome.is_fullscreen());
        assert_eq!(chrome.size(), before);
    }

    #[test]
    fn drag_never_leaves_bounds() {
        let limits = PanelLimits::default();
        let mut chrome = PanelChrome::new(limits, screen());
        let origin = egui::pos2(500.0, 500.0);
        chrome.begin_resize(ResizeHandle::Corner, origin);

        for delta in [-1.0e9_f32, -5000.0, -1.0, 0.0, 1.0, 5000.0, 1.0e9] {
            chrome.drag_to(origin + egui::vec2(delta, -delta));
            let size = chrome.size();
            assert!(size.x >= limits.min.x && size.x <= limits.max.x, "{size:?}");
            assert!(size.y >= limits.min.y && size.y <= limits.max.y, "{size:?}");
        }
    }

    #[test]
    fn edge_handles_change_one_axis() {
        let mut chrome = PanelChrome::new(PanelLimits::default(), egui::vec2(1000.0, 800.0));
        let start = chrome.size();

        chrome.begin_resize(ResizeHandle::Right, egui::pos2(0.0, 0.0));
        chrome.drag_to(egui::pos2(50.0, 70.0));
        assert_eq!(chrome.size(), egui::vec2(start.x + 50.0, start.y));
        chrome.end_resize();

        chrome.begin_resize(ResizeHandle::Bottom, egui::pos2(0.0, 0.0));
        chrome.drag_to(egui::pos2(90.0, -40.0));
        assert_eq!(chrome.size(), egui::vec2(start.x + 50.0, start.y - 40.0));
        chrome.end_resize();
        assert!(!chrome.is_resizing());
    }

    #[test]
    fn pointer_motion_without_a_drag_is_ignored() {
        let mut chrome = PanelChrome::new(PanelLimits::default(), screen());
        let before = chrome.size();
        chrome.drag_to(egui::pos2(5000.0, 5000.0));
        assert_eq!(chrome.size(), before);
    }

    #[test]
    fn image_area_keeps_a_minimum_height() {
        let chrome = PanelChrome::new(PanelLimits::default(), egui::vec2(300.0, 200.0));
        assert_eq!(chrome.image_area_height(), 400.0);
        let chrome = PanelChrome::new(PanelLimits::default(), screen());
        assert!((chrome.image_area_height() - 698.0).abs() < 0.01);
    }

    #[test]
    fn only_presses_outside_close_the_panel() {
        let panel = Rect::from_min_size(egui::pos2(100.0, 100.0), egui::vec2(400.0, 300.0));
        assert!(!press_closes_panel(panel, egui::pos2(300.0, 250.0)));
        // Handles sit inside the panel rectangle.
        for handle in ResizeHandle::ALL {
            assert!(!press_closes_panel(panel, handle.rect(panel).center()));
        }
        assert!(press_closes_panel(panel, egui::pos2(50.0, 250.0)));
        assert!(press_closes_panel(panel, egui::pos2(300.0, 401.0)));
    }
}
