use serde::Serialize;
use tauri::{AppHandle, Emitter, State};
use tauri_plugin_dialog::DialogExt;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

use crate::session::{Session, SessionView};
use wr_state::{MatchupState, Role};

#[tauri::command]
pub fn get_session(session: State<'_, Session>) -> SessionView {
    session.view()
}

#[tauri::command]
pub fn set_my_hero(name: String, session: State<'_, Session>) -> MatchupState {
    session.set_my_hero(&name)
}

#[tauri::command]
pub fn set_enemy_hero(name: String, session: State<'_, Session>) -> MatchupState {
    session.set_enemy_hero(&name)
}

/// `role` is the display label, e.g. "中路"
#[tauri::command]
pub fn set_role(role: Role, session: State<'_, Session>) -> MatchupState {
    session.set_role(role)
}

#[tauri::command]
pub fn add_enemy_item(item: String, session: State<'_, Session>) -> MatchupState {
    session.add_enemy_item(&item)
}

#[tauri::command]
pub fn remove_enemy_item(index: usize, session: State<'_, Session>) -> MatchupState {
    session.remove_enemy_item(index)
}

/// Returns false when the request was ignored (a hero is missing)
#[tauri::command]
pub fn analyze(session: State<'_, Session>) -> bool {
    session.analyze().is_some()
}

#[tauri::command]
pub async fn start_live(session: State<'_, Session>) -> Result<bool, String> {
    session.start_live().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub fn stop_live(session: State<'_, Session>) -> bool {
    session.stop_live()
}

/// Screenshot handed over by the page as a `data:` URL
#[tauri::command]
pub async fn recognize_screenshot(
    data_url: String,
    session: State<'_, Session>,
) -> Result<MatchupState, String> {
    session
        .recognize_data_url(&data_url)
        .await
        .map_err(|e| format!("{:#}", e))
}

/// Let the user pick a screenshot from disk and recognize it.
/// `Ok(None)` means the picker was dismissed.
#[tauri::command]
pub async fn pick_screenshot(
    app_handle: AppHandle,
    session: State<'_, Session>,
) -> Result<Option<MatchupState>, String> {
    let (tx, rx) = oneshot::channel();
    app_handle
        .dialog()
        .file()
        .add_filter("图片", &["png", "jpg", "jpeg", "webp", "bmp"])
        .pick_file(move |path| {
            let _ = tx.send(path);
        });

    let Some(picked) = rx.await.map_err(|e| e.to_string())? else {
        debug!("Screenshot picker dismissed");
        return Ok(None);
    };
    let path = picked.into_path().map_err(|e| e.to_string())?;
    info!("Recognizing screenshot {}", path.display());

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    session
        .recognize_upload(&bytes)
        .await
        .map(Some)
        .map_err(|e| format!("{:#}", e))
}

#[tauri::command]
pub fn clear_error(session: State<'_, Session>) {
    session.clear_error();
}

/// Forward every change on `rx` to the page as `event`
fn forward<T>(app_handle: &AppHandle, event: &'static str, mut rx: watch::Receiver<T>)
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    let app = app_handle.clone();
    tauri::async_runtime::spawn(async move {
        loop {
            if rx.changed().await.is_err() {
                break;
            }
            let payload = rx.borrow_and_update().clone();
            let _ = app.emit(event, payload);
        }
    });
}

/// Push state changes to the frontend
pub fn spawn_emitters(app_handle: &AppHandle, session: &Session) {
    forward(app_handle, "matchup-state", session.subscribe_matchup());
    forward(app_handle, "sync-state", session.subscribe_sync());
    forward(app_handle, "analysis", session.subscribe_analysis());
    forward(app_handle, "session-error", session.subscribe_error());
    forward(app_handle, "activity", session.subscribe_activity());
    forward(app_handle, "live-frame", session.subscribe_frames());
}
