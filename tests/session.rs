mod common;

use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use wr_capture::TrackKind;
use wr_data::GameData;
use wr_state::{MergePolicy, Role};
use wr_tactician_lib::{Session, SyncState, ANALYSIS_FAILED, RECOGNITION_FAILED};

fn session_with(model: Arc<FakeModel>, policy: MergePolicy) -> (Session, Arc<FakeFactory>) {
    let display = FakeFactory::new(TrackKind::Display, Open::Track);
    let mut config = fast_config();
    config.recognition.upload_policy = policy;
    let session = Session::new(
        &config,
        model,
        desktop_adapter(display.clone()),
        GameData::builtin(),
    );
    (session, display)
}

#[tokio::test]
async fn test_upload_respects_unknown_enemy() {
    let model = Arc::new(FakeModel::new(recognition("李青", "未知", &["水银之靴"])));
    let (session, _) = session_with(model, MergePolicy::RespectSentinels);
    session.set_enemy_hero("盖伦");
    session.add_enemy_item("饮血剑");

    let matchup = session.recognize_upload(&png_bytes()).await.unwrap();
    assert_eq!(matchup.my_hero, "李青");
    assert_eq!(matchup.enemy_hero, "盖伦");
    assert_eq!(matchup.enemy_items, vec!["水银之靴".to_string()]);
    assert!(!session.is_uploading());
    assert!(session.error().is_none());
}

#[tokio::test]
async fn test_uploading_visible_while_recognizing() {
    let model = Arc::new(
        FakeModel::new(recognition("李青", "盖伦", &[])).with_delay(Duration::from_millis(100)),
    );
    let (session, _) = session_with(model, MergePolicy::default());
    let mut activity = session.subscribe_activity();
    let bytes = png_bytes();

    let (matchup, seen) = tokio::join!(session.recognize_upload(&bytes), async {
        within(activity.wait_for(|a| a.uploading)).await.is_ok()
    });
    assert!(seen);
    assert_eq!(matchup.unwrap().my_hero, "李青");
    assert!(!session.is_uploading());
    assert!(!session.activity().scanning);
}

#[tokio::test]
async fn test_upload_overwrite_policy() {
    let model = Arc::new(FakeModel::new(recognition("李青", "未知", &[])));
    let (session, _) = session_with(model, MergePolicy::Overwrite);
    session.set_enemy_hero("盖伦");
    session.add_enemy_item("饮血剑");

    let matchup = session.recognize_upload(&png_bytes()).await.unwrap();
    assert_eq!(matchup.enemy_hero, "未知");
    assert!(matchup.enemy_items.is_empty());
}

#[tokio::test]
async fn test_upload_failure_sets_message() {
    let model = Arc::new(
        FakeModel::new(recognition("李青", "盖伦", &[])).with_script(vec![Step::Fail]),
    );
    let (session, _) = session_with(model.clone(), MergePolicy::default());

    assert!(session.recognize_upload(&png_bytes()).await.is_err());
    assert_eq!(session.error().as_deref(), Some(RECOGNITION_FAILED));
    assert_eq!(session.matchup().my_hero, "");

    // Garbage never reaches the model
    assert!(session.recognize_upload(b"not an image").await.is_err());
    assert_eq!(session.error().as_deref(), Some(RECOGNITION_FAILED));
    assert_eq!(model.recognize_calls.load(Ordering::SeqCst), 1);

    // A good upload clears the message
    session.recognize_upload(&png_bytes()).await.unwrap();
    assert!(session.error().is_none());
}

#[tokio::test]
async fn test_data_url_upload() {
    use base64::Engine as _;

    let model = Arc::new(FakeModel::new(recognition("亚索", "盖伦", &[])));
    let (session, _) = session_with(model, MergePolicy::default());
    let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes());

    let matchup = session
        .recognize_data_url(&format!("data:image/png;base64,{}", encoded))
        .await
        .unwrap();
    assert_eq!(matchup.my_hero, "亚索");
}

#[tokio::test]
async fn test_manual_analyze() {
    let model = Arc::new(FakeModel::new(recognition("未知", "未知", &[])));
    let (session, _) = session_with(model.clone(), MergePolicy::default());

    assert!(session.analyze().is_none());

    session.set_my_hero("亚索");
    session.set_role(Role::Top);
    session.set_enemy_hero("盖伦");
    // Not live: edits alone never queue an analysis
    assert_eq!(session.analysis().completed, 0);

    let ticket = session.analyze().unwrap();
    let status = within(session.analysis_settled(ticket)).await;
    assert!(!status.loading);
    assert_eq!(status.result.unwrap().matchup_analysis, "亚索 对线 盖伦");

    let sent = &model.analyses()[0];
    assert_eq!(sent.my_role, Role::Top);
    assert!(sent.enemy_items.is_empty());
}

#[tokio::test]
async fn test_analysis_failure_banner() {
    let model = Arc::new(FakeModel::new(recognition("未知", "未知", &[])));
    model.fail_analysis.store(true, Ordering::SeqCst);
    let (session, _) = session_with(model, MergePolicy::default());
    session.set_my_hero("亚索");
    session.set_enemy_hero("盖伦");

    let ticket = session.analyze().unwrap();
    let status = within(session.analysis_settled(ticket)).await;
    assert_eq!(status.error.as_deref(), Some(ANALYSIS_FAILED));
    assert!(status.result.is_none());

    session.clear_error();
    assert!(session.analysis().error.is_none());
}

#[tokio::test]
async fn test_live_edits_trigger_analysis() {
    let model = Arc::new(FakeModel::new(recognition("未知", "未知", &[])));
    let (session, display) = session_with(model.clone(), MergePolicy::default());

    assert!(session.start_live().await.unwrap());
    assert_eq!(session.sync_state(), SyncState::Live);

    session.set_my_hero("亚索");
    assert_eq!(session.analysis().completed, 0);
    session.set_enemy_hero("盖伦");

    let mut analysis = session.subscribe_analysis();
    within(analysis.wait_for(|s| s.completed >= 1)).await.unwrap();
    assert_eq!(model.analyses()[0].enemy_hero, "盖伦");

    assert!(session.stop_live());
    session.shutdown();
    assert_eq!(display.stops(), 1);
}

#[tokio::test]
async fn test_start_failure_message() {
    let model = Arc::new(FakeModel::new(recognition("未知", "未知", &[])));
    let display = FakeFactory::new(TrackKind::Display, Open::Deny);
    let session = Session::new(
        &fast_config(),
        model,
        desktop_adapter(display),
        GameData::builtin(),
    );

    assert!(session.start_live().await.is_err());
    assert_eq!(session.error().as_deref(), Some("无法开启屏幕共享"));
    assert_eq!(session.sync_state(), SyncState::Idle);
}

#[tokio::test]
async fn test_view_serializes_for_the_page() {
    let model = Arc::new(FakeModel::new(recognition("未知", "未知", &[])));
    let (session, _) = session_with(model, MergePolicy::default());
    session.set_role(Role::Support);
    session.add_enemy_item("守护者之铠");

    let view = serde_json::to_value(session.view()).unwrap();
    assert_eq!(view["syncState"], "idle");
    assert_eq!(view["captureStrategy"], "display");
    assert_eq!(view["matchup"]["myRole"], "辅助");
    assert_eq!(view["matchup"]["enemyItems"][0], "守护者之铠");
    assert_eq!(view["roles"].as_array().unwrap().len(), 5);
    assert_eq!(view["analysis"]["loading"], false);
    assert_eq!(view["scanning"], false);
    assert_eq!(view["uploading"], false);
    assert!(view["liveFrame"].is_null());
    assert!(!view["heroSuggestions"].as_array().unwrap().is_empty());
}
