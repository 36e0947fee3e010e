pub mod activity;
pub mod analysis;
#[cfg(feature = "desktop")]
mod commands;
pub mod config;
pub mod pipeline;
pub mod session;
pub mod store;

pub use activity::{Activity, ActivityState, Busy};
pub use analysis::{AnalysisQueue, AnalysisStatus, Ticket, ANALYSIS_FAILED};
pub use config::{ConfigError, TacticianConfig};
pub use pipeline::{StartError, StartFailure, SyncController, SyncState, SyncTiming};
pub use session::{Session, SessionView, RECOGNITION_FAILED};
pub use store::{Commit, MatchupStore};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wr_tactician=debug,wr_capture=debug,wr_advisor=debug".into()),
        )
        .init();
}

#[cfg(feature = "desktop")]
pub fn run() -> anyhow::Result<()> {
    use anyhow::Context;
    use tauri::Manager;

    init_tracing();

    let config = TacticianConfig::load()?;
    let session = tauri::async_runtime::block_on(async { Session::from_config(&config) })?;

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .manage(session)
        .setup(|app| {
            commands::spawn_emitters(app.handle(), &app.state::<Session>());
            Ok(())
        })
        .on_window_event(|window, event| {
            if let tauri::WindowEvent::Destroyed = event {
                window.state::<Session>().shutdown();
            }
        })
        .invoke_handler(tauri::generate_handler![
            commands::get_session,
            commands::set_my_hero,
            commands::set_enemy_hero,
            commands::set_role,
            commands::add_enemy_item,
            commands::remove_enemy_item,
            commands::analyze,
            commands::start_live,
            commands::stop_live,
            commands::recognize_screenshot,
            commands::pick_screenshot,
            commands::clear_error,
        ])
        .build(tauri::generate_context!())
        .context("error while building tauri application")?;

    app.run(|app_handle, event| {
        if let tauri::RunEvent::Exit = event {
            app_handle.state::<Session>().shutdown();
        }
    });
    Ok(())
}
