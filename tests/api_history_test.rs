mod helpers;

use std::sync::Arc;

use axum::http::StatusCode;
use helpers::{get, json_body, post_json, test_state, FakeModel};
use serde_json::json;
use tempfile::TempDir;
use tichat::inference::{ChatMessage, Role};
use tichat::session::SessionRecord;

fn seed_session(state: &tichat::api::SharedState, title: &str, pairs: &[(&str, &str)]) -> String {
    let path = state.sessions.create_session().unwrap();
    state
        .sessions
        .append(&path, &SessionRecord::title(title))
        .unwrap();
    for (q, r) in pairs {
        state
            .sessions
            .append(&path, &SessionRecord::exchange(*q, *r))
            .unwrap();
    }
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[tokio::test]
async fn choosing_a_session_replays_it_into_memory() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some(Arc::new(FakeModel::new(&["next"]))), None);
    let filename = seed_session(&state, "Letters", &[("What is X?", "A letter."), ("And Y?", "Also.")]);

    let (status, body) = post_json(
        &state,
        "/api/choose_chat_history",
        json!({"filename": filename}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json_body(&body),
        json!([
            {"title": "Letters"},
            {"query": "What is X?", "response": "A letter."},
            {"query": "And Y?", "response": "Also."}
        ])
    );

    {
        let ctx = state.context.lock().await;
        assert!(ctx.current_session().unwrap().ends_with(&filename));
        let messages = ctx.memory().get_all();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], ChatMessage::user("What is X?"));
        assert_eq!(messages[3].role, Role::Assistant);
    }

    // New turns go to the chosen session.
    let (status, _) = post_json(&state, "/api/query", json!({"query": "And Z?"})).await;
    assert_eq!(status, StatusCode::OK);
    let loaded = state.sessions.load_session(&filename).unwrap();
    assert_eq!(loaded.records.len(), 4);
    assert_eq!(loaded.records[3], SessionRecord::exchange("And Z?", "next"));
    assert_eq!(state.sessions.count_sessions(), 1);
}

#[tokio::test]
async fn unknown_session_is_not_found_and_state_is_kept() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some(Arc::new(FakeModel::new(&["x"]))), None);
    let filename = seed_session(&state, "Kept", &[("q", "r")]);

    let (status, _) = post_json(&state, "/api/choose_chat_history", json!({"filename": filename})).await;
    assert_eq!(status, StatusCode::OK);

    for missing in ["session_99.json", "../settings.json", "session_1"] {
        let (status, body) =
            post_json(&state, "/api/choose_chat_history", json!({"filename": missing})).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{missing}");
        assert_eq!(json_body(&body), json!({"error": "Session not found"}));
    }

    let ctx = state.context.lock().await;
    assert!(ctx.current_session().unwrap().ends_with(&filename));
    assert_eq!(ctx.memory().len(), 2);
}

#[tokio::test]
async fn empty_session_file_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, None, None);
    let path = state.sessions.create_session().unwrap();
    let filename = path.file_name().unwrap().to_string_lossy().into_owned();

    let (status, _) = post_json(&state, "/api/choose_chat_history", json!({"filename": filename})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(state.context.lock().await.current_session().is_none());
}

#[tokio::test]
async fn missing_filename_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, None, None);

    let (status, body) = post_json(&state, "/api/choose_chat_history", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body), json!({"error": "Filename parameter missing"}));

    // Present but empty is a lookup, not a missing parameter.
    let (status, body) = post_json(&state, "/api/choose_chat_history", json!({"filename": ""})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body), json!({"error": "Session not found"}));
}

#[tokio::test]
async fn history_lists_only_titled_sessions() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, None, None);
    seed_session(&state, "First", &[("a", "b")]);
    state.sessions.create_session().unwrap();
    seed_session(&state, "Third", &[]);

    let (status, body) = get(&state, "/api/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json_body(&body),
        json!([["First", "session_1.json"], ["Third", "session_3.json"]])
    );
}

#[tokio::test]
async fn new_chat_resets_context() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some(Arc::new(FakeModel::new(&["reply"]))), None);

    let (status, _) = post_json(&state, "/api/query", json!({"query": "hello"})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(state.context.lock().await.current_session().is_some());

    let (status, body) = get(&state, "/api/new_chat").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"message": "New chat session started"}));
    {
        let ctx = state.context.lock().await;
        assert!(ctx.current_session().is_none());
        assert!(ctx.memory().is_empty());
    }

    // The next turn starts a second session.
    let (status, _) = post_json(&state, "/api/query", json!({"query": "again"})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(tmp.path().join("prev_msgs/session_2.json").exists());
}
