use std::sync::Arc;
use std::time::Instant;

use eframe::egui::{
    self, Color32, FontId, Rect, Sense, Stroke, TextureHandle, TextureOptions, Vec2,
};

use crate::chrome::{press_closes_panel, PanelChrome, ResizeHandle};
use crate::config::PlayerConfig;
use crate::decoder::ImageDecoder;
use crate::display_set::DisplaySet;
use crate::playback::{CinePlayback, FrameRate};
use crate::prefetch::FramePrefetcher;
use crate::renderer::{render_frame, FrameSurface, ERROR_BACKGROUND};

pub const EMPTY_MESSAGE: &str = "No images available for playback.";
const INSTRUCTIONS: &str =
    "Click to Play/Pause • Click Outside to Close • Space: Play/Pause • ←/→: Step • Esc: Close";
const IMAGE_ID_PREVIEW_CHARS: usize = 60;
const SCROLL_DEAD_ZONE: f32 = 0.5;
const SCROLL_PER_FRAME: f32 = 30.0;

const PANEL_FILL: Color32 = Color32::from_gray(18);
const PANEL_STROKE: Color32 = Color32::from_gray(56);
const PANEL_ROUNDING: f32 = 16.0;
const PANEL_MARGIN: f32 = 16.0;
const ACCENT: Color32 = Color32::from_rgb(74, 158, 255);
const HANDLE_FILL: Color32 = Color32::from_rgba_premultiplied(30, 65, 123, 128);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerResponse {
    pub close_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Rendered,
    Loading,
    Waiting,
}

impl FrameStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Rendered => "Rendering Complete",
            Self::Loading => "Loading...",
            Self::Waiting => "Waiting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub frame_number: String,
    pub progress: String,
    pub image_id: String,
    pub modality: String,
    pub series: String,
    pub activity: Option<String>,
}

impl Placeholder {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        [
            Some(self.frame_number.as_str()),
            Some(self.progress.as_str()),
            Some(self.image_id.as_str()),
            Some(self.modality.as_str()),
            Some(self.series.as_str()),
            self.activity.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

enum Canvas {
    Blank,
    Frame { index: usize, size: Vec2 },
    Failed { index: usize, size: Vec2, message: String },
}

impl Canvas {
    fn index(&self) -> Option<usize> {
        match self {
            Self::Blank => None,
            Self::Frame { index, .. } | Self::Failed { index, .. } => Some(*index),
        }
    }
}

pub struct CineStackPlayer {
    display_set: DisplaySet,
    playback: CinePlayback,
    prefetch: FramePrefetcher,
    chrome: PanelChrome,
    canvas: Canvas,
    texture: Option<TextureHandle>,
    preloaded_center: Option<usize>,
    scroll_accum: f32,
}

impl CineStackPlayer {
    pub fn new(
        display_set: DisplaySet,
        decoder: Arc<dyn ImageDecoder>,
        config: &PlayerConfig,
        ctx: &egui::Context,
    ) -> Self {
        let image_ids: Arc<[String]> = display_set.image_ids.clone().into();
        let playback = CinePlayback::new(image_ids.len(), config.frame_rate);
        let prefetch = FramePrefetcher::new(image_ids, decoder, config.preload_radius)
            .with_cache_limit(config.cache_limit)
            .with_repaint(ctx.clone());
        let chrome = PanelChrome::new(config.panel, ctx.screen_rect().size());

        log::debug!(
            "Opening cine player for {:?} with {} frame(s)",
            display_set.title(),
            display_set.len()
        );

        Self {
            display_set,
            playback,
            prefetch,
            chrome,
            canvas: Canvas::Blank,
            texture: None,
            preloaded_center: None,
            scroll_accum: 0.0,
        }
    }

    pub fn status(&self) -> FrameStatus {
        let current = self.playback.current();
        if self.prefetch.is_cached(current) {
            FrameStatus::Rendered
        } else if self.prefetch.is_loading(current) {
            FrameStatus::Loading
        } else {
            FrameStatus::Waiting
        }
    }

    pub fn placeholder(&self) -> Option<Placeholder> {
        if self.display_set.is_empty() || self.status() == FrameStatus::Rendered {
            return None;
        }
        let current = self.playback.current();
        Some(placeholder_for(
            &self.display_set,
            current,
            self.prefetch.is_loading(current),
            self.playback.is_playing(),
            self.playback.frame_rate(),
        ))
    }

    pub fn show(&mut self, ctx: &egui::Context) -> PlayerResponse {
        let mut response = PlayerResponse::default();
        let screen = ctx.screen_rect();

        if self.display_set.is_empty() {
            close_on_escape(ctx, &mut response);
            let panel = self.chrome.panel_rect(screen);
            self.show_empty(ctx, panel, &mut response);
            self.close_on_outside_press(ctx, panel, &mut response);
            return response;
        }

        let now = Instant::now();
        close_on_escape(ctx, &mut response);
        self.handle_keys(ctx, now);
        self.playback.tick(now);
        self.sync_frames(ctx);
        self.track_resize(ctx);

        let panel = self.chrome.panel_rect(screen);
        self.show_panel(ctx, panel, now, &mut response);
        self.close_on_outside_press(ctx, panel, &mut response);

        if let Some(wait) = self.playback.time_until_next_tick(now) {
            ctx.request_repaint_after(wait);
        }
        response
    }

    fn handle_keys(&mut self, ctx: &egui::Context, now: Instant) {
        let (toggle, back, forward) = ctx.input_mut(|input| {
            (
                input.consume_key(egui::Modifiers::NONE, egui::Key::Space),
                input.consume_key(egui::Modifiers::NONE, egui::Key::ArrowLeft),
                input.consume_key(egui::Modifiers::NONE, egui::Key::ArrowRight),
            )
        });
        if toggle {
            self.playback.toggle_play_pause(now);
        }
        if back {
            self.playback.step(-1, now);
        }
        if forward {
            self.playback.step(1, now);
        }
    }

    fn sync_frames(&mut self, ctx: &egui::Context) {
        let current = self.playback.current();
        if self.preloaded_center != Some(current) {
            self.prefetch.preload_around(current);
            self.preloaded_center = Some(current);
        }

        let landed = self.prefetch.poll();
        let stale = self.canvas.index() != Some(current);
        if (stale || landed.contains(&current)) && self.prefetch.is_cached(current) {
            self.refresh_canvas(ctx, current);
        }
    }

    fn refresh_canvas(&mut self, ctx: &egui::Context, index: usize) {
        let Some(image) = self.prefetch.cached(index) else {
            return;
        };
        self.canvas = match render_frame(&image) {
            FrameSurface::Image(color_image) => {
                let size = egui::vec2(color_image.size[0] as f32, color_image.size[1] as f32);
                if let Some(texture) = self.texture.as_mut() {
                    texture.set(color_image, TextureOptions::LINEAR);
                } else {
                    self.texture =
                        Some(ctx.load_texture("cine-frame", color_image, TextureOptions::LINEAR));
                }
                Canvas::Frame { index, size }
            }
            FrameSurface::Failed { size, message } => Canvas::Failed {
                index,
                size: egui::vec2(size[0] as f32, size[1] as f32),
                message,
            },
        };
    }

    fn track_resize(&mut self, ctx: &egui::Context) {
        if !self.chrome.is_resizing() {
            return;
        }
        let (pointer, released) = ctx.input(|input| {
            (
                input.pointer.latest_pos(),
                input.pointer.any_released() || !input.pointer.any_down(),
            )
        });
        if let Some(pointer) = pointer {
            self.chrome.drag_to(pointer);
        }
        if released {
            self.chrome.end_resize();
        }
        if let Some(handle) = self.chrome.active_handle() {
            ctx.set_cursor_icon(handle.cursor());
        }
    }

    fn close_on_outside_press(
        &self,
        ctx: &egui::Context,
        panel: Rect,
        response: &mut PlayerResponse,
    ) {
        if self.chrome.is_resizing() {
            return;
        }
        let press = ctx.input(|input| {
            if input.pointer.any_pressed() {
                input.pointer.press_origin()
            } else {
                None
            }
        });
        if press.is_some_and(|press| press_closes_panel(panel, press)) {
            log::debug!("Pointer pressed outside the cine panel; closing");
            response.close_requested = true;
        }
    }

    fn show_empty(&mut self, ctx: &egui::Context, panel: Rect, response: &mut PlayerResponse) {
        egui::Area::new(egui::Id::new("cine-player"))
            .order(egui::Order::Foreground)
            .fixed_pos(panel.min)
            .show(ctx, |ui| {
                let (rect, _) = ui.allocate_exact_size(panel.size(), Sense::hover());
                paint_panel_background(ui, rect);
                ui.allocate_new_ui(
                    egui::UiBuilder::new().max_rect(rect.shrink(PANEL_MARGIN)),
                    |ui| {
                        ui.horizontal(|ui| {
                            ui.heading(self.display_set.title());
                            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                                if ui.button("X").on_hover_text("Close").clicked() {
                                    response.close_requested = true;
                                }
                            });
                        });
                        ui.centered_and_justified(|ui| {
                            ui.label(egui::RichText::new(EMPTY_MESSAGE).size(18.0));
                        });
                    },
                );
            });
    }

    fn show_panel(
        &mut self,
        ctx: &egui::Context,
        panel: Rect,
        now: Instant,
        response: &mut PlayerResponse,
    ) {
        let viewing_area = ctx.screen_rect().size();
        egui::Area::new(egui::Id::new("cine-player"))
            .order(egui::Order::Foreground)
            .fixed_pos(panel.min)
            .show(ctx, |ui| {
                let (rect, background) = ui.allocate_exact_size(panel.size(), Sense::click());
                paint_panel_background(ui, rect);

                ui.allocate_new_ui(
                    egui::UiBuilder::new().max_rect(rect.shrink(PANEL_MARGIN)),
                    |ui| {
                        ui.set_clip_rect(rect);
                        self.show_header(ui, viewing_area, response);
                        ui.add_space(6.0);
                        self.show_image_area(ui, now);
                        ui.add_space(6.0);
                        self.show_controls(ui, now);
                        ui.add_space(4.0);
                        ui.vertical_centered(|ui| {
                            ui.label(
                                egui::RichText::new(INSTRUCTIONS)
                                    .size(11.0)
                                    .color(Color32::from_gray(140)),
                            );
                        });
                    },
                );

                self.show_resize_handles(ui, rect);

                if background.clicked() && !self.chrome.is_resizing() {
                    self.playback.toggle_play_pause(now);
                }
                if !self.chrome.is_resizing() && background.hovered() {
                    ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
                }
            });
    }

    fn show_header(&mut self, ui: &mut egui::Ui, viewing_area: Vec2, response: &mut PlayerResponse) {
        ui.horizontal(|ui| {
            ui.heading(self.display_set.title());
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("X").on_hover_text("Close").clicked() {
                    response.close_requested = true;
                }
                let (label, hint) = if self.chrome.is_fullscreen() {
                    ("▭", "Exit Fullscreen")
                } else {
                    ("□", "Enter Fullscreen")
                };
                if ui.button(label).on_hover_text(hint).clicked() {
                    self.chrome.toggle_fullscreen(viewing_area);
                }
            });
        });
    }

    fn show_image_area(&mut self, ui: &mut egui::Ui, now: Instant) {
        let size = egui::vec2(ui.available_width(), self.chrome.image_area_height());
        let (area, hover) = ui.allocate_exact_size(size, Sense::hover());
        if hover.hovered() {
            let scroll = ui.input(|input| input.raw_scroll_delta.y);
            let step = frame_step_from_scroll(&mut self.scroll_accum, scroll);
            if step != 0 {
                self.playback.step(step, now);
                ui.ctx().request_repaint();
            }
        }
        let painter = ui.painter_at(area);
        painter.rect(
            area,
            12.0,
            Color32::BLACK,
            Stroke::new(2.0, Color32::from_gray(0x33)),
        );

        let current = self.playback.current();
        match &self.canvas {
            Canvas::Frame { index, size } if *index == current => {
                if let Some(texture) = self.texture.as_ref() {
                    painter.image(
                        texture.id(),
                        fit_within(area.shrink(2.0), *size),
                        Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        Color32::WHITE,
                    );
                }
            }
            Canvas::Failed {
                index,
                size,
                message,
            } if *index == current => {
                let surface = fit_within(area.shrink(2.0), *size);
                painter.rect_filled(surface, 0.0, ERROR_BACKGROUND);
                painter.text(
                    surface.center(),
                    egui::Align2::CENTER_CENTER,
                    message,
                    FontId::proportional(20.0),
                    Color32::WHITE,
                );
            }
            _ => {
                if let Some(placeholder) = self.placeholder() {
                    paint_placeholder(&painter, area, &placeholder);
                }
            }
        }
    }

    fn show_controls(&mut self, ui: &mut egui::Ui, now: Instant) {
        let total = self.playback.total_frames();
        let frame_number = self.playback.current() + 1;
        let rate = self.playback.frame_rate();

        ui.horizontal(|ui| {
            ui.label(format!("Frame Rate: {} fps", rate.get()));
            ui.separator();
            ui.label(if self.playback.is_playing() {
                "Playing"
            } else {
                "Paused"
            });
            ui.separator();
            ui.label(format!("Loaded: {}/{}", self.prefetch.cached_count(), total));
        });

        ui.horizontal(|ui| {
            ui.label("Speed:");
            let mut fps = rate.get();
            if ui
                .add(egui::Slider::new(&mut fps, FrameRate::MIN..=FrameRate::MAX).suffix(" fps"))
                .changed()
            {
                self.playback
                    .set_frame_rate(FrameRate::saturating(u32::from(fps)), now);
            }
        });

        ui.horizontal(|ui| {
            let label = format!("{frame_number} / {total}");
            let bar_width = (ui.available_width() - 96.0).max(80.0);
            ui.add(
                egui::ProgressBar::new(frame_number as f32 / total.max(1) as f32)
                    .desired_width(bar_width)
                    .fill(ACCENT),
            );
            ui.label(label);
        });

        ui.horizontal(|ui| {
            ui.label(format!(
                "Patient ID: {}",
                self.display_set.patient_id.as_deref().unwrap_or("N/A")
            ));
            ui.separator();
            ui.label(format!(
                "Study Date: {}",
                self.display_set.study_date.as_deref().unwrap_or("N/A")
            ));
            ui.separator();
            ui.label(format!("Status: {}", self.status().label()));
        });
    }

    fn show_resize_handles(&mut self, ui: &mut egui::Ui, panel: Rect) {
        for handle in ResizeHandle::ALL {
            let rect = handle.rect(panel);
            let response = ui.interact(rect, egui::Id::new(("cine-resize", handle)), Sense::drag());
            ui.painter().rect_filled(rect, 4.0, HANDLE_FILL);

            if response.hovered() || response.dragged() {
                ui.ctx().set_cursor_icon(handle.cursor());
            }
            if response.drag_started() {
                if let Some(pointer) = response.interact_pointer_pos() {
                    self.chrome.begin_resize(handle, pointer);
                }
            }
        }
    }
}

impl CineStackPlayer {
    fn shutdown(&mut self) {
        self.playback.stop();
        self.chrome.end_resize();
        log::debug!(
            "Closed cine player ({} frame(s) cached, {} decode(s) still running)",
            self.prefetch.cached_count(),
            self.prefetch.pending_count()
        );
    }
}

impl Drop for CineStackPlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn close_on_escape(ctx: &egui::Context, response: &mut PlayerResponse) {
    if ctx.input_mut(|input| input.consume_key(egui::Modifiers::NONE, egui::Key::Escape)) {
        response.close_requested = true;
    }
}

pub fn placeholder_for(
    display_set: &DisplaySet,
    index: usize,
    loading: bool,
    playing: bool,
    frame_rate: FrameRate,
) -> Placeholder {
    let total = display_set.len();
    let frame_number = index + 1;
    let image_id = display_set
        .image_ids
        .get(index)
        .map(|id| truncate_id(id))
        .unwrap_or_else(|| "N/A".to_string());

    let activity = if loading {
        Some("Loading image...".to_string())
    } else if playing {
        Some(format!("Playing... ({} fps)", frame_rate.get()))
    } else {
        None
    };

    Placeholder {
        frame_number: frame_number.to_string(),
        progress: if loading {
            format!("Loading... {frame_number} / {total}")
        } else {
            format!("Image {frame_number} / {total}")
        },
        image_id,
        modality: format!(
            "Modality: {}",
            display_set.modality.as_deref().unwrap_or("N/A")
        ),
        series: format!(
            "Series: #{}",
            display_set.series_number.as_deref().unwrap_or("N/A")
        ),
        activity,
    }
}

/// Whole frames to move for a wheel delta. Scrolling up goes back.
fn frame_step_from_scroll(accum: &mut f32, scroll: f32) -> i64 {
    if scroll.abs() <= SCROLL_DEAD_ZONE {
        return 0;
    }
    if accum.signum() != scroll.signum() {
        *accum = 0.0;
    }
    *accum += scroll;
    let steps = (*accum / SCROLL_PER_FRAME).trunc();
    *accum -= steps * SCROLL_PER_FRAME;
    -(steps as i64)
}

fn truncate_id(id: &str) -> String {
    let mut chars = id.chars();
    let head: String = chars.by_ref().take(IMAGE_ID_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn fit_within(area: Rect, content: Vec2) -> Rect {
    if content.x <= 0.0 || content.y <= 0.0 || !area.is_positive() {
        return area;
    }
    let scale = (area.width() / content.x).min(area.height() / content.y);
    Rect::from_center_size(area.center(), content * scale)
}

fn paint_panel_background(ui: &egui::Ui, rect: Rect) {
    ui.painter().rect(
        rect,
        PANEL_ROUNDING,
        PANEL_FILL,
        Stroke::new(1.0, PANEL_STROKE),
    );
}

fn paint_placeholder(painter: &egui::Painter, area: Rect, placeholder: &Placeholder) {
    const STYLES: [(f32, Color32); 6] = [
        (48.0, ACCENT),
        (18.0, Color32::from_gray(224)),
        (12.0, Color32::from_gray(136)),
        (14.0, Color32::from_gray(187)),
        (14.0, Color32::from_gray(187)),
        (12.0, ACCENT),
    ];
    const SPACING: f32 = 10.0;

    let rows: Vec<(&str, f32, Color32)> = placeholder
        .lines()
        .zip(STYLES)
        .map(|(text, (size, color))| (text, size, color))
        .collect();
    let rows_height: f32 = rows.iter().map(|(_, size, _)| size + SPACING).sum();

    let mut y = area.center().y - rows_height / 2.0;
    for (text, size, color) in rows {
        painter.text(
            egui::pos2(area.center().x, y + size / 2.0),
            egui::Align2::CENTER_CENTER,
            text,
            FontId::proportional(size),
            color,
        );
        y += size + SPACING;
    }
}
