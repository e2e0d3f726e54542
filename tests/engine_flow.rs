//! End-to-end engine flows against the in-memory and libSQL stores.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use guided_onboarding::access::AccessContext;
use guided_onboarding::access::AccessRules;
use guided_onboarding::access::tabs::TabOrder;
use guided_onboarding::engine::{
    Effect, EffectRecorder, EngineDeps, Transition, TutorialEngine, WorkspaceContext,
};
use guided_onboarding::persistence::{
    LibSqlProgressStore, MemoryProgressStore, ProgressDoc, ProgressStore, ProgressWriter,
    RestoreDecision, TutorialRecord, spawn_progress_writer,
};
use guided_onboarding::progress::CompletedTutorials;
use guided_onboarding::sync::SyncOutcome;
use guided_onboarding::tutorial::{
    AccessMode, Catalog, ProfileTab, SequenceGraph, Track, TutorialId, WorkspaceType,
};

struct Fixture {
    engine: TutorialEngine,
    store: Arc<MemoryProgressStore>,
    writer: ProgressWriter,
    effects: Arc<EffectRecorder>,
}

fn fixture(track: Track) -> Fixture {
    fixture_with_store(track, Arc::new(MemoryProgressStore::new()))
}

fn fixture_with_store(track: Track, store: Arc<MemoryProgressStore>) -> Fixture {
    let (writer, _handle) = spawn_progress_writer(store.clone());
    let effects = Arc::new(EffectRecorder::new());
    let deps = EngineDeps::standard(store.clone(), writer.clone(), effects.clone(), effects.clone())
        .unwrap();
    Fixture {
        engine: TutorialEngine::new(deps, "user-1", track),
        store,
        writer,
        effects,
    }
}

fn completed(ids: &[&str]) -> BTreeMap<String, TutorialRecord> {
    ids.iter()
        .map(|id| {
            (
                id.to_string(),
                TutorialRecord {
                    completed: true,
                    completed_at: None,
                },
            )
        })
        .collect()
}

#[test]
fn next_tutorial_skips_completed_entries() {
    let graph = SequenceGraph::standard().unwrap();
    let none = CompletedTutorials::default();
    assert_eq!(
        graph.next_tutorial(TutorialId::ProfileTabs, Track::Professional, &none),
        Some(TutorialId::Dashboard)
    );

    let dashboard_done: CompletedTutorials = [TutorialId::Dashboard].into_iter().collect();
    assert_eq!(
        graph.next_tutorial(TutorialId::ProfileTabs, Track::Professional, &dashboard_done),
        Some(TutorialId::Messages)
    );
}

#[tokio::test]
async fn critical_tab_grants_full_access_permanently() {
    let mut f = fixture(Track::Professional);
    assert_eq!(
        TabOrder::for_track(Track::Professional).tabs(),
        &[
            ProfileTab::PersonalDetails,
            ProfileTab::ProfessionalBackground,
            ProfileTab::BillingInformation,
            ProfileTab::DocumentUploads,
            ProfileTab::Marketplace,
            ProfileTab::Account,
        ]
    );

    f.engine.start_tutorial(TutorialId::ProfileTabs);
    f.engine.on_tab_completed(ProfileTab::DocumentUploads, true);
    assert_eq!(f.engine.state().access_mode, AccessMode::Full);

    assert!(!f.engine.set_access_mode(AccessMode::Progressive));
    assert_eq!(f.engine.state().access_mode, AccessMode::Full);

    f.writer.flush().await;
    let doc = f.store.doc("user-1", Track::Professional).await.unwrap();
    assert_eq!(doc.access_mode.as_deref(), Some("full"));
}

#[test]
fn organization_is_team_only() {
    let rules = AccessRules::standard();
    let ctx = AccessContext {
        workspace_type: WorkspaceType::Personal,
        tutorial_passed: true,
        access_mode: AccessMode::Full,
        ..AccessContext::default()
    };
    assert!(!rules.is_sidebar_item_accessible("/dashboard/organization", &ctx));
}

#[tokio::test]
async fn manual_navigation_syncs_step_and_writes_once() {
    let store = Arc::new(MemoryProgressStore::new());
    store
        .insert(
            "user-1",
            Track::Professional,
            ProgressDoc {
                max_accessed_profile_tab: Some("billingInformation".into()),
                ..ProgressDoc::default()
            },
        )
        .await;
    let mut f = fixture_with_store(Track::Professional, store);
    f.engine.load_remote().await;
    f.engine.start_tutorial(TutorialId::ProfileTabs);
    f.writer.flush().await;
    let before = f.store.save_count();

    let t0 = Instant::now();
    let path = "/dashboard/profile/billingInformation";
    assert_eq!(
        f.engine.on_navigation_at(path, t0),
        SyncOutcome::StepSynced { from: 0, to: 2 }
    );
    f.engine
        .on_navigation_at(path, t0 + Duration::from_millis(100));
    assert_eq!(f.engine.state().current_step_index, 2);

    f.writer.flush().await;
    assert_eq!(f.store.save_count(), before + 1);
    let doc = f.store.doc("user-1", Track::Professional).await.unwrap();
    assert_eq!(doc.current_step_index, 2);
    assert_eq!(doc.active_tutorial.as_deref(), Some("profileTabs"));
}

#[tokio::test]
async fn repeated_sync_inside_window_is_debounced() {
    let store = Arc::new(MemoryProgressStore::new());
    store
        .insert(
            "user-1",
            Track::Professional,
            ProgressDoc {
                max_accessed_profile_tab: Some("billingInformation".into()),
                ..ProgressDoc::default()
            },
        )
        .await;
    let mut f = fixture_with_store(Track::Professional, store);
    f.engine.load_remote().await;
    f.engine.start_tutorial(TutorialId::ProfileTabs);

    let t0 = Instant::now();
    let path = "/dashboard/profile/billingInformation";
    f.engine.on_navigation_at(path, t0);
    f.engine.prev_step();
    assert_eq!(
        f.engine
            .on_navigation_at(path, t0 + Duration::from_millis(100)),
        SyncOutcome::Debounced { step: 2 }
    );
    assert_eq!(f.engine.state().current_step_index, 1);

    assert_eq!(
        f.engine
            .on_navigation_at(path, t0 + Duration::from_millis(600)),
        SyncOutcome::StepSynced { from: 1, to: 2 }
    );
}

#[test]
fn last_step_boundaries() {
    let catalog = Catalog::standard().unwrap();
    assert_eq!(catalog.total_steps(TutorialId::Calendar), 3);
    assert!(catalog.is_last_step(TutorialId::Calendar, 2));
    assert!(!catalog.is_last_step(TutorialId::Calendar, 1));
}

#[tokio::test]
async fn locked_tab_route_is_left_alone() {
    let mut f = fixture(Track::Professional);
    f.engine.start_tutorial(TutorialId::ProfileTabs);
    assert_eq!(
        f.engine
            .on_navigation("/dashboard/profile/billingInformation"),
        SyncOutcome::TabLocked { step: 2 }
    );
    assert_eq!(f.engine.state().current_step_index, 0);
}

#[tokio::test]
async fn profile_guard_redirects_with_workspace() {
    let mut f = fixture(Track::Professional);
    f.engine.set_workspace(WorkspaceContext {
        workspace_id: Some("ws-9".into()),
        ..WorkspaceContext::default()
    });
    f.engine.start_tutorial(TutorialId::ProfileTabs);
    let outcome = f.engine.on_navigation("/dashboard/calendar");
    assert!(matches!(outcome, SyncOutcome::Redirect { .. }));
    assert_eq!(
        f.effects.drain(),
        vec![
            Effect::Warning("Please complete your profile configuration to continue.".into()),
            Effect::Navigate("/dashboard/profile?workspace=ws-9".into()),
        ]
    );
}

#[tokio::test]
async fn dashboard_tour_hands_off_to_profile() {
    let mut f = fixture(Track::Professional);
    f.engine.start_tutorial(TutorialId::Dashboard);

    f.engine.on_navigation("/dashboard/messages");
    assert_eq!(
        f.effects.drain(),
        vec![
            Effect::Warning("Please follow the onboarding guide.".into()),
            Effect::Navigate("/dashboard/overview".into()),
        ]
    );

    for _ in 0..3 {
        f.engine.next_step();
    }
    f.engine.on_navigation("/dashboard/calendar");
    assert_eq!(
        f.effects.drain()[0],
        Effect::Warning("Please click on Profile to proceed.".into())
    );

    assert_eq!(
        f.engine.on_navigation("/dashboard/profile"),
        SyncOutcome::CompleteTutorial
    );
    assert!(f.engine.state().completed.is_completed(TutorialId::Dashboard));
    assert!(!f.engine.state().is_tutorial_active());
}

#[tokio::test]
async fn messages_tour_advances_on_arrival() {
    let mut f = fixture(Track::Professional);
    f.engine.start_tutorial(TutorialId::Messages);
    f.engine.next_step();
    assert_eq!(f.engine.current_step().unwrap().id, "messages-overview");
    assert_eq!(
        f.engine.on_navigation("/dashboard/messages"),
        SyncOutcome::Advanced { from: 1, to: 2 }
    );
}

#[tokio::test]
async fn button_navigation_does_not_skip_messages_overview() {
    let mut f = fixture(Track::Professional);
    f.engine.start_tutorial(TutorialId::Messages);
    assert_eq!(
        f.engine.navigate_and_advance("/dashboard/messages"),
        Transition::Moved { from: 0, to: 1 }
    );
    assert_eq!(
        f.engine.on_navigation("/dashboard/messages"),
        SyncOutcome::TransitionSettled
    );
    assert_eq!(f.engine.current_step().unwrap().id, "messages-overview");
    assert!(!f.engine.state().is_busy);

    f.writer.flush().await;
    let doc = f.store.doc("user-1", Track::Professional).await.unwrap();
    assert_eq!(doc.current_step_index, 1);
}

#[tokio::test]
async fn finishing_the_track_passes_onboarding() {
    let mut f = fixture(Track::Facility);
    let sequence = [
        TutorialId::FacilityProfileTabs,
        TutorialId::Dashboard,
        TutorialId::Messages,
        TutorialId::Contracts,
        TutorialId::Calendar,
        TutorialId::Payroll,
        TutorialId::Organization,
        TutorialId::Account,
    ];
    for (i, tutorial) in sequence.iter().enumerate() {
        assert!(!f.engine.state().tutorial_passed);
        f.engine.start_tutorial(*tutorial);
        let transition = f.engine.complete_tutorial();
        let expected_next = sequence.get(i + 1).copied();
        assert_eq!(
            transition,
            Transition::Completed {
                tutorial: *tutorial,
                next: expected_next
            }
        );
    }
    assert!(f.engine.state().tutorial_passed);
    assert_eq!(f.engine.snapshot().completion_percentage, 100);
    assert_eq!(
        f.engine.on_navigation("/dashboard/messages"),
        SyncOutcome::Inactive
    );

    f.writer.flush().await;
    let doc = f.store.doc("user-1", Track::Facility).await.unwrap();
    assert!(doc.completed);
    assert!(doc.tutorial_passed);
}

#[tokio::test]
async fn restore_adopts_saved_position_once() {
    let store = Arc::new(MemoryProgressStore::new());
    store
        .insert(
            "user-1",
            Track::Professional,
            ProgressDoc {
                active_tutorial: Some("messages".into()),
                current_step_index: 2,
                tutorials: completed(&["profileTabs", "dashboard"]),
                ..ProgressDoc::default()
            },
        )
        .await;
    let mut f = fixture_with_store(Track::Professional, store);

    assert_eq!(
        f.engine.load_remote().await,
        Some(RestoreDecision::Adopt {
            tutorial: TutorialId::Messages,
            step: 2
        })
    );
    assert!(f.engine.state().completed.is_completed(TutorialId::Dashboard));

    f.engine.stop_tutorial();
    f.writer.flush().await;
    // A stale remote copy of the same position must not re-activate it.
    let stale = ProgressDoc {
        active_tutorial: Some("messages".into()),
        current_step_index: 2,
        ..ProgressDoc::default()
    };
    assert_eq!(
        f.engine.apply_remote(&stale),
        RestoreDecision::AlreadyRestored
    );
    assert!(!f.engine.state().is_tutorial_active());
}

#[tokio::test]
async fn restore_never_regresses_local_progress() {
    let mut f = fixture(Track::Professional);
    f.engine.start_tutorial(TutorialId::ProfileTabs);
    f.engine.on_tab_completed(ProfileTab::PersonalDetails, true);
    f.engine.on_tab_completed(ProfileTab::DocumentUploads, true);
    f.engine.stop_tutorial();
    f.engine.start_tutorial(TutorialId::Contracts);
    f.engine.complete_tutorial();

    let remote = ProgressDoc {
        access_mode: Some("progressive".into()),
        max_accessed_profile_tab: Some("personalDetails".into()),
        ..ProgressDoc::default()
    };
    f.engine.apply_remote(&remote);
    assert_eq!(f.engine.state().access_mode, AccessMode::Full);
    assert!(f.engine.state().completed.is_completed(TutorialId::Contracts));
    assert_eq!(
        f.engine.state().max_accessed_profile_tab,
        ProfileTab::ProfessionalBackground
    );
}

#[tokio::test]
async fn store_failures_do_not_interrupt_the_session() {
    let store = Arc::new(MemoryProgressStore::new());
    store.set_fail_loads(true);
    store.set_fail_saves(true);
    let mut f = fixture_with_store(Track::Professional, store);

    assert_eq!(f.engine.load_remote().await, None);
    assert!(f.engine.start_tutorial(TutorialId::Calendar));
    assert_eq!(f.engine.next_step(), Transition::Moved { from: 0, to: 1 });
    f.writer.flush().await;
    assert!(f.store.save_count() >= 2);
    assert!(f.store.doc("user-1", Track::Professional).await.is_none());

    f.store.set_fail_saves(false);
    f.engine.next_step();
    f.writer.flush().await;
    let doc = f.store.doc("user-1", Track::Professional).await.unwrap();
    assert_eq!(doc.current_step_index, 2);
}

#[tokio::test]
async fn progress_survives_a_new_session_on_libsql() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.db");
    let effects = Arc::new(EffectRecorder::new());

    {
        let store: Arc<dyn ProgressStore> =
            Arc::new(LibSqlProgressStore::new_local(&path).await.unwrap());
        let (writer, _handle) = spawn_progress_writer(store.clone());
        let deps = EngineDeps::standard(store, writer.clone(), effects.clone(), effects.clone())
            .unwrap();
        let mut engine = TutorialEngine::new(deps, "user-7", Track::Professional);
        engine.start_tutorial(TutorialId::Contracts);
        engine.next_step();
        writer.flush().await;
    }

    let store: Arc<dyn ProgressStore> =
        Arc::new(LibSqlProgressStore::new_local(&path).await.unwrap());
    let (writer, _handle) = spawn_progress_writer(store.clone());
    let deps = EngineDeps::standard(store, writer, effects.clone(), effects).unwrap();
    let mut engine = TutorialEngine::new(deps, "user-7", Track::Professional);
    assert_eq!(
        engine.load_remote().await,
        Some(RestoreDecision::Adopt {
            tutorial: TutorialId::Contracts,
            step: 1
        })
    );
    assert_eq!(engine.current_step().unwrap().id, "contracts-list");
}
