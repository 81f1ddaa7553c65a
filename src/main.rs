mod app;
mod chrome;
mod config;
mod decoder;
mod display_set;
mod launch;
mod playback;
mod player;
mod prefetch;
mod renderer;

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    let (initial_request, initial_status) = match launch::parse_launch_request_from_args(&cli_args)
    {
        Ok(request) => (request, None),
        Err(err) => {
            log::warn!("Launch args error: {err}");
            (None, Some(format!("Launch args error: {err}")))
        }
    };
    let config = config::PlayerConfig::from_env();
    log::info!(
        "Starting stackcine (preload radius {}, {} fps)",
        config.preload_radius,
        config.frame_rate.get()
    );

    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title("Stack Cine")
            .with_inner_size([1280.0, 820.0])
            .with_min_inner_size([640.0, 480.0])
            .with_resizable(true),
        ..Default::default()
    };

    eframe::run_native(
        "Stack Cine",
        native_options,
        Box::new(move |cc| {
            Ok(Box::new(app::CineViewerApp::new(
                config,
                initial_request,
                initial_status,
                &cc.egui_ctx,
            )))
        }),
    )
}
