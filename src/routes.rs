//! REST endpoints driving tutorial sessions.
//!
//! One [`TutorialEngine`] per `(user, track)`, created on first use and
//! hydrated from the progress store. Responses carry the engine snapshot
//! plus any navigation/warning effects the call produced.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::access::AccessRules;
use crate::config::EngineConfig;
use crate::engine::{EffectRecorder, EngineDeps, TutorialEngine, WorkspaceContext};
use crate::persistence::{ProgressStore, ProgressWriter};
use crate::tutorial::{AccessMode, Catalog, ProfileTab, SequenceGraph, Track, TutorialId};

type Reply = (StatusCode, Json<Value>);

/// A live session and the effects it has queued.
pub struct Session {
    pub engine: Mutex<TutorialEngine>,
    pub effects: Arc<EffectRecorder>,
    last_used: std::sync::Mutex<Instant>,
}

impl Session {
    fn touch(&self, now: Instant) {
        let mut last = self.last_used.lock().unwrap_or_else(|p| p.into_inner());
        *last = (*last).max(now);
    }

    fn idle_for(&self, now: Instant) -> Duration {
        let last = self.last_used.lock().unwrap_or_else(|p| p.into_inner());
        now.saturating_duration_since(*last)
    }
}

/// Sessions keyed by user and track, sharing one catalog and store.
pub struct SessionRegistry {
    catalog: Arc<Catalog>,
    sequences: Arc<SequenceGraph>,
    rules: Arc<AccessRules>,
    store: Arc<dyn ProgressStore>,
    writer: ProgressWriter,
    config: EngineConfig,
    sessions: RwLock<HashMap<(String, Track), Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        writer: ProgressWriter,
        config: EngineConfig,
    ) -> crate::error::Result<Self> {
        Ok(Self {
            catalog: Arc::new(Catalog::standard()?),
            sequences: Arc::new(SequenceGraph::standard()?),
            rules: Arc::new(AccessRules::standard()),
            store,
            writer,
            config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Get the session, creating and restoring it on first use.
    pub async fn session(&self, user_id: &str, track: Track) -> Arc<Session> {
        let key = (user_id.to_string(), track);
        if let Some(session) = self.sessions.read().await.get(&key) {
            session.touch(Instant::now());
            return Arc::clone(session);
        }

        let effects = Arc::new(EffectRecorder::new());
        let deps = EngineDeps {
            catalog: Arc::clone(&self.catalog),
            sequences: Arc::clone(&self.sequences),
            rules: Arc::clone(&self.rules),
            store: Arc::clone(&self.store),
            writer: self.writer.clone(),
            navigator: effects.clone(),
            warnings: effects.clone(),
            config: self.config.clone(),
        };
        let mut engine = TutorialEngine::new(deps, user_id, track);
        engine.load_remote().await;

        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(key).or_insert_with(|| {
            info!(user_id, track = %track, "Session created");
            Arc::new(Session {
                engine: Mutex::new(engine),
                effects,
                last_used: std::sync::Mutex::new(Instant::now()),
            })
        });
        session.touch(Instant::now());
        Arc::clone(session)
    }

    /// Drop a session from memory. Its progress stays in the store and the
    /// next request restores it.
    pub async fn end_session(&self, user_id: &str, track: Track) -> bool {
        let removed = self
            .sessions
            .write()
            .await
            .remove(&(user_id.to_string(), track))
            .is_some();
        if removed {
            info!(user_id, track = %track, "Session ended");
        }
        removed
    }

    /// Evict sessions idle for at least the configured timeout.
    pub async fn prune_idle(&self, now: Instant) -> usize {
        let timeout = self.config.session_idle_timeout;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.idle_for(now) < timeout);
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(pruned, remaining = sessions.len(), "Pruned idle sessions");
        }
        pruned
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Periodically evict idle sessions.
pub fn spawn_session_pruner(sessions: Arc<SessionRegistry>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // Skip immediate first tick
        loop {
            interval.tick().await;
            sessions.prune_idle(Instant::now()).await;
        }
    })
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
}

/// Build the tutorial REST router.
pub fn tutorial_routes(sessions: Arc<SessionRegistry>) -> Router {
    let state = AppState { sessions };
    let session = "/api/sessions/{user}/{track}";

    Router::new()
        .route("/health", get(health))
        .route("/api/tutorials/{tutorial}/steps", get(list_steps))
        .route(session, delete(end_session))
        .route(&format!("{session}/state"), get(session_state))
        .route(&format!("{session}/start/{{tutorial}}"), post(start))
        .route(&format!("{session}/next"), post(next))
        .route(&format!("{session}/previous"), post(previous))
        .route(&format!("{session}/pause"), post(pause))
        .route(&format!("{session}/resume"), post(resume))
        .route(&format!("{session}/complete"), post(complete))
        .route(&format!("{session}/skip"), post(skip))
        .route(&format!("{session}/stop"), post(stop))
        .route(&format!("{session}/navigate"), post(navigate))
        .route(&format!("{session}/tabs/{{tab}}/complete"), post(tab_completed))
        .route(&format!("{session}/profile-sync"), post(profile_sync))
        .route(&format!("{session}/access-mode"), post(access_mode))
        .route(&format!("{session}/workspace"), post(workspace))
        .route(&format!("{session}/features/{{tutorial}}/enter"), post(feature_entered))
        .route(&format!("{session}/access/sidebar"), get(sidebar_access))
        .route(&format!("{session}/access/tabs/{{tab}}"), get(tab_access))
        .route(&format!("{session}/access/features/{{feature}}"), get(feature_access))
        .route(&format!("{session}/next-tutorial"), get(next_tutorial))
        .with_state(state)
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn error(status: StatusCode, message: &str) -> Reply {
    (status, Json(json!({ "error": message })))
}

fn parse_track(raw: &str) -> Result<Track, Reply> {
    Track::parse(raw).ok_or_else(|| error(StatusCode::BAD_REQUEST, "Unknown track"))
}

fn parse_tutorial(raw: &str) -> Result<TutorialId, Reply> {
    TutorialId::parse(raw).ok_or_else(|| error(StatusCode::NOT_FOUND, "Unknown tutorial"))
}

fn parse_tab(raw: &str) -> Result<ProfileTab, Reply> {
    ProfileTab::parse(raw).ok_or_else(|| error(StatusCode::BAD_REQUEST, "Unknown profile tab"))
}

/// Run `f` against the session's engine and wrap its result with the
/// snapshot and drained effects.
async fn with_engine<T, F>(state: &AppState, user: &str, track: &str, f: F) -> Reply
where
    T: serde::Serialize,
    F: FnOnce(&mut TutorialEngine) -> T,
{
    let track = match parse_track(track) {
        Ok(track) => track,
        Err(reply) => return reply,
    };
    let session = state.sessions.session(user, track).await;
    let mut engine = session.engine.lock().await;
    let result = f(&mut engine);
    let body = json!({
        "result": result,
        "snapshot": engine.snapshot(),
        "effects": session.effects.drain(),
    });
    (StatusCode::OK, Json(body))
}

// ── Catalog ─────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "guided-onboarding"
    }))
}

async fn list_steps(
    State(state): State<AppState>,
    Path(tutorial): Path<String>,
) -> impl IntoResponse {
    // Unknown tutorials have no steps.
    let steps = state.sessions.catalog().steps_by_name(&tutorial);
    (StatusCode::OK, Json(json!(steps)))
}

async fn end_session(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
) -> impl IntoResponse {
    let track = match parse_track(&track) {
        Ok(track) => track,
        Err(reply) => return reply,
    };
    let ended = state.sessions.end_session(&user, track).await;
    (StatusCode::OK, Json(json!({ "result": ended })))
}

async fn session_state(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
) -> impl IntoResponse {
    with_engine(&state, &user, &track, |_| Value::Null).await
}

// ── Transitions ─────────────────────────────────────────────────────────

async fn start(
    State(state): State<AppState>,
    Path((user, track, tutorial)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let id = match parse_tutorial(&tutorial) {
        Ok(id) => id,
        Err(reply) => return reply,
    };
    with_engine(&state, &user, &track, |engine| engine.start_tutorial(id)).await
}

async fn next(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
) -> impl IntoResponse {
    with_engine(&state, &user, &track, |engine| engine.next_step()).await
}

async fn previous(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
) -> impl IntoResponse {
    with_engine(&state, &user, &track, |engine| engine.prev_step()).await
}

async fn pause(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
) -> impl IntoResponse {
    with_engine(&state, &user, &track, |engine| engine.pause_tutorial()).await
}

async fn resume(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
) -> impl IntoResponse {
    with_engine(&state, &user, &track, |engine| engine.resume_tutorial()).await
}

async fn complete(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
) -> impl IntoResponse {
    with_engine(&state, &user, &track, |engine| engine.complete_tutorial()).await
}

async fn skip(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
) -> impl IntoResponse {
    with_engine(&state, &user, &track, |engine| engine.skip_tutorial()).await
}

async fn stop(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
) -> impl IntoResponse {
    with_engine(&state, &user, &track, |engine| engine.stop_tutorial()).await
}

#[derive(Deserialize)]
struct NavigateRequest {
    path: String,
}

async fn navigate(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
    Json(body): Json<NavigateRequest>,
) -> impl IntoResponse {
    debug!(user = %user, path = %body.path, "Navigation event");
    with_engine(&state, &user, &track, |engine| engine.on_navigation(&body.path)).await
}

#[derive(Deserialize)]
struct TabCompletedQuery {
    complete: Option<bool>,
}

async fn tab_completed(
    State(state): State<AppState>,
    Path((user, track, tab)): Path<(String, String, String)>,
    Query(query): Query<TabCompletedQuery>,
) -> impl IntoResponse {
    let tab = match parse_tab(&tab) {
        Ok(tab) => tab,
        Err(reply) => return reply,
    };
    let complete = query.complete.unwrap_or(true);
    with_engine(&state, &user, &track, |engine| {
        engine.on_tab_completed(tab, complete)
    })
    .await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileSyncRequest {
    completed_tabs: Vec<String>,
}

async fn profile_sync(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
    Json(body): Json<ProfileSyncRequest>,
) -> impl IntoResponse {
    let mut completed = HashSet::new();
    for raw in &body.completed_tabs {
        match parse_tab(raw) {
            Ok(tab) => {
                completed.insert(tab);
            }
            Err(reply) => return reply,
        }
    }
    let oracle = move |tab: ProfileTab| completed.contains(&tab);
    with_engine(&state, &user, &track, |engine| {
        engine.sync_profile_initial_state(&oracle)
    })
    .await
}

#[derive(Deserialize)]
struct AccessModeRequest {
    mode: String,
}

async fn access_mode(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
    Json(body): Json<AccessModeRequest>,
) -> impl IntoResponse {
    let Some(mode) = AccessMode::parse(&body.mode) else {
        return error(StatusCode::BAD_REQUEST, "Unknown access mode");
    };
    with_engine(&state, &user, &track, |engine| engine.set_access_mode(mode)).await
}

async fn workspace(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
    Json(body): Json<WorkspaceContext>,
) -> impl IntoResponse {
    with_engine(&state, &user, &track, |engine| engine.set_workspace(body)).await
}

async fn feature_entered(
    State(state): State<AppState>,
    Path((user, track, tutorial)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let id = match parse_tutorial(&tutorial) {
        Ok(id) => id,
        Err(reply) => return reply,
    };
    with_engine(&state, &user, &track, |engine| engine.on_feature_entered(id)).await
}

// ── Access queries ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SidebarQuery {
    path: String,
}

async fn sidebar_access(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
    Query(query): Query<SidebarQuery>,
) -> impl IntoResponse {
    with_engine(&state, &user, &track, |engine| {
        engine.is_sidebar_item_accessible(&query.path)
    })
    .await
}

async fn tab_access(
    State(state): State<AppState>,
    Path((user, track, tab)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let tab = match parse_tab(&tab) {
        Ok(tab) => tab,
        Err(reply) => return reply,
    };
    with_engine(&state, &user, &track, |engine| {
        engine.is_profile_tab_accessible(tab)
    })
    .await
}

async fn feature_access(
    State(state): State<AppState>,
    Path((user, track, feature)): Path<(String, String, String)>,
) -> impl IntoResponse {
    with_engine(&state, &user, &track, |engine| {
        engine.is_feature_accessible(&feature)
    })
    .await
}

async fn next_tutorial(
    State(state): State<AppState>,
    Path((user, track)): Path<(String, String)>,
) -> impl IntoResponse {
    with_engine(&state, &user, &track, |engine| engine.next_tutorial(None)).await
}
