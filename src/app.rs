use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use eframe::egui::{self, ViewportCommand};

use crate::config::PlayerConfig;
use crate::decoder::{CachingDecoder, DicomFileDecoder, ImageDecoder};
use crate::display_set::DisplaySet;
use crate::launch::LaunchRequest;
use crate::player::CineStackPlayer;

const APP_TITLE: &str = "Stack Cine";
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

type SeriesLoad = Result<DisplaySet, String>;

pub struct CineViewerApp {
    config: PlayerConfig,
    decoder: Arc<dyn ImageDecoder>,
    display_set: Option<DisplaySet>,
    player: Option<CineStackPlayer>,
    series_receiver: Option<Receiver<SeriesLoad>>,
    status_line: String,
}

impl CineViewerApp {
    pub fn new(
        mut config: PlayerConfig,
        initial_request: Option<LaunchRequest>,
        initial_status: Option<String>,
        ctx: &egui::Context,
    ) -> Self {
        let decoder: Arc<dyn ImageDecoder> =
            Arc::new(CachingDecoder::new(DicomFileDecoder::new(), config.decoder_cache));
        if let Some(rate) = initial_request.as_ref().and_then(|request| request.frame_rate) {
            config.frame_rate = rate;
        }

        let mut app = Self {
            config,
            decoder,
            display_set: None,
            player: None,
            series_receiver: None,
            status_line: initial_status.unwrap_or_else(|| "Open a DICOM series to play.".to_string()),
        };
        if let Some(request) = initial_request {
            app.start_series_load(request.paths, ctx);
        }
        app
    }

    fn apply_black_background(ctx: &egui::Context) {
        let mut visuals = egui::Visuals::dark();
        let line_base = egui::Color32::from_gray(28);
        visuals.panel_fill = egui::Color32::BLACK;
        visuals.window_fill = egui::Color32::BLACK;
        visuals.extreme_bg_color = egui::Color32::BLACK;
        visuals.window_stroke = egui::Stroke::new(1.0, line_base);
        visuals.widgets.noninteractive.bg_stroke = egui::Stroke::new(1.0, line_base);
        ctx.set_visuals(visuals);
    }

    fn is_loading(&self) -> bool {
        self.series_receiver.is_some()
    }

    fn start_series_load(&mut self, paths: Vec<PathBuf>, ctx: &egui::Context) {
        if paths.is_empty() {
            return;
        }
        self.player = None;
        self.status_line = format!("Reading {} path(s)...", paths.len());

        let (tx, rx) = mpsc::channel();
        let repaint = ctx.clone();
        thread::spawn(move || {
            let result = DisplaySet::from_paths(&paths).map_err(|err| format!("{err:#}"));
            let _ = tx.send(result);
            repaint.request_repaint();
        });
        self.series_receiver = Some(rx);
    }

    fn poll_series_load(&mut self, ctx: &egui::Context) {
        let Some(receiver) = self.series_receiver.as_ref() else {
            return;
        };
        match receiver.try_recv() {
            Ok(Ok(display_set)) => {
                self.series_receiver = None;
                self.status_line = format!(
                    "{}: {} frame(s)",
                    display_set.title(),
                    display_set.len()
                );
                self.display_set = Some(display_set);
                self.mount_player(ctx);
            }
            Ok(Err(err)) => {
                self.series_receiver = None;
                log::warn!("Could not open series: {err}");
                self.status_line = format!("Could not open series: {err}");
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.series_receiver = None;
                self.status_line = "Series loader stopped unexpectedly.".to_string();
            }
        }
    }

    fn mount_player(&mut self, ctx: &egui::Context) {
        if let Some(display_set) = self.display_set.clone() {
            self.player = Some(CineStackPlayer::new(
                display_set,
                Arc::clone(&self.decoder),
                &self.config,
                ctx,
            ));
        }
    }

    fn show_landing(&mut self, ctx: &egui::Context) {
        let mut picked = None;
        let mut replay = false;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() * 0.3);
                ui.heading(format!("{APP_TITLE} v{APP_VERSION}"));
                ui.add_space(12.0);

                ui.add_enabled_ui(!self.is_loading(), |ui| {
                    ui.horizontal(|ui| {
                        if ui.button("Open Files…").clicked() {
                            picked = rfd::FileDialog::new()
                                .set_title("Open DICOM files")
                                .pick_files();
                        }
                        if ui.button("Open Folder…").clicked() {
                            picked = rfd::FileDialog::new()
                                .set_title("Open DICOM series folder")
                                .pick_folder()
                                .map(|folder| vec![folder]);
                        }
                        if self.display_set.is_some()
                            && self.player.is_none()
                            && ui.button("Play Again").clicked()
                        {
                            replay = true;
                        }
                    });
                });

                ui.add_space(8.0);
                ui.label(
                    egui::RichText::new(&self.status_line)
                        .size(12.0)
                        .color(egui::Color32::from_gray(170)),
                );
            });
        });

        if let Some(paths) = picked {
            self.start_series_load(paths, ctx);
        }
        if replay {
            self.mount_player(ctx);
        }
    }
}

impl eframe::App for CineViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        Self::apply_black_background(ctx);
        if self.is_loading() {
            ctx.set_cursor_icon(egui::CursorIcon::Progress);
        }
        self.poll_series_load(ctx);

        let close_requested =
            ctx.input_mut(|input| input.consume_key(egui::Modifiers::COMMAND, egui::Key::W));
        if close_requested {
            ctx.send_viewport_cmd(ViewportCommand::Close);
            return;
        }

        self.show_landing(ctx);

        let closed = self
            .player
            .as_mut()
            .is_some_and(|player| player.show(ctx).close_requested);
        if closed {
            self.player = None;
            self.status_line = "Player closed.".to_string();
        }
    }
}
