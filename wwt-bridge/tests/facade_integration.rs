//! Integration tests for the facade against the simulated engine.
//!
//! Run with: `cargo test --test facade_integration`

use std::sync::Arc;
use std::time::Duration;

use wwt_bridge::engine::{
    EngineCommand, EngineSetting, Folder, GotoRaDecZoom, ImageSetInfo, SimulatedCatalog,
    SimulatedEngine, TourInfo,
};
use wwt_bridge::facade::{LoadImageCollection, LoadTour};
use wwt_bridge::load_cache::LoadState;
use wwt_bridge::{BridgeError, WwtFacade};

// ============================================================================
// Helper Functions
// ============================================================================

fn surveys() -> Folder {
    Folder {
        name: "Surveys".to_string(),
        url: "a.wtml".to_string(),
        imagesets: vec![ImageSetInfo {
            name: "Hydrogen Alpha".to_string(),
            url: "halpha/{1}/{2}".to_string(),
            thumbnail_url: None,
        }],
        children: vec![],
    }
}

fn setup() -> (Arc<SimulatedEngine>, Arc<WwtFacade>) {
    let catalog = SimulatedCatalog::default()
        .with_collection(surveys())
        .with_tour(TourInfo::from_stop_durations("orion.wtt", &[8.0, 4.0]))
        .with_tour(TourInfo::from_stop_durations("m31.wtt", &[6.0]))
        .with_imageset("Digitized Sky Survey (Color)");
    let engine = Arc::new(SimulatedEngine::with_catalog(catalog));
    let facade = Arc::new(WwtFacade::new(engine.clone()));
    (engine, facade)
}

/// Let spawned tasks run until they block.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

#[tokio::test]
async fn test_three_moves_only_last_arrives() {
    let (engine, facade) = setup();

    let moves: Vec<_> = [10.0, 20.0, 30.0]
        .into_iter()
        .map(|ra| facade.goto_ra_dec_zoom(GotoRaDecZoom::from_degrees(ra, 0.0, 1.0, false)))
        .collect();
    // Spawned newest first; supersession follows call order regardless.
    let handles: Vec<_> = moves.into_iter().rev().map(tokio::spawn).collect();
    let handles: Vec<_> = handles.into_iter().rev().collect();

    engine.fire_arrived();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert!(results[0].as_ref().unwrap_err().is_superseded());
    assert!(results[1].as_ref().unwrap_err().is_superseded());
    assert!(results[2].is_ok());

    assert_eq!(facade.arrival().pending(), 0);
    assert!((facade.state().engine.ra_rad - 30f64.to_radians()).abs() < 1e-12);
}

#[tokio::test]
async fn test_tour_load_superseded_by_newer_tour() {
    let (engine, facade) = setup();

    let first = {
        let facade = Arc::clone(&facade);
        tokio::spawn(async move { facade.load_tour(LoadTour::new("orion.wtt")).await })
    };
    settle().await;
    let second = {
        let facade = Arc::clone(&facade);
        tokio::spawn(async move { facade.load_tour(LoadTour::new("m31.wtt")).await })
    };
    settle().await;

    assert!(engine.fire_tour_ready());

    assert!(first.await.unwrap().unwrap_err().is_superseded());
    let tour = second.await.unwrap().unwrap();
    assert_eq!(tour.url, "m31.wtt");
    assert_eq!(tour.run_time_secs, 6.0);
}

#[tokio::test]
async fn test_camera_and_tour_channels_are_independent() {
    let (engine, facade) = setup();

    let tour = {
        let facade = Arc::clone(&facade);
        tokio::spawn(async move { facade.load_tour(LoadTour::new("orion.wtt")).await })
    };
    settle().await;

    // An instant move must not disturb the tour waiter.
    facade
        .goto_ra_dec_zoom(GotoRaDecZoom::from_degrees(1.0, 1.0, 1.0, true))
        .await
        .unwrap();

    engine.fire_tour_ready();
    assert_eq!(tour.await.unwrap().unwrap().stop_count(), 2);
}

#[tokio::test]
async fn test_collection_requested_three_times_loads_once() {
    let (engine, facade) = setup();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let facade = Arc::clone(&facade);
        handles.push(tokio::spawn(async move {
            facade
                .load_image_collection(LoadImageCollection::new("a.wtml"))
                .await
        }));
    }
    settle().await;

    assert_eq!(engine.collection_loads("a.wtml"), 1);
    assert_eq!(
        facade.collections().state("a.wtml"),
        LoadState::InFlight { waiters: 3 }
    );

    engine.complete_collection("a.wtml");

    let folders: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();
    assert!(folders.iter().all(|f| Arc::ptr_eq(f, &folders[0])));
    assert_eq!(folders[0].name, "Surveys");

    // Completed entries are served without touching the engine.
    let again = facade
        .load_image_collection(LoadImageCollection::new("a.wtml").with_child_folders())
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&again, &folders[0]));
    assert_eq!(engine.collection_loads("a.wtml"), 1);
}

#[tokio::test]
async fn test_failed_collection_can_be_retried() {
    let (engine, facade) = setup();

    let first = {
        let facade = Arc::clone(&facade);
        tokio::spawn(async move {
            facade
                .load_image_collection(LoadImageCollection::new("a.wtml"))
                .await
        })
    };
    settle().await;
    engine.fail_collection("a.wtml", "connection reset");

    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(err, BridgeError::Load(_)));
    assert!(!err.is_superseded());

    engine.set_immediate_collections(true);
    let folder = facade
        .load_image_collection(LoadImageCollection::new("a.wtml"))
        .await
        .unwrap();
    assert_eq!(folder.url, "a.wtml");
    assert_eq!(engine.collection_loads("a.wtml"), 2);
}

#[tokio::test]
async fn test_imagesets_from_loaded_collection_are_selectable() {
    let (engine, facade) = setup();
    engine.set_immediate_collections(true);

    assert!(facade.set_foreground_imageset("Hydrogen Alpha").is_err());
    facade
        .load_image_collection(LoadImageCollection::new("a.wtml"))
        .await
        .unwrap();
    facade.set_foreground_imageset("Hydrogen Alpha").unwrap();
    facade
        .set_background_imageset("Digitized Sky Survey (Color)")
        .unwrap();
    facade.set_foreground_opacity(0.25);

    let state = facade.state().engine;
    assert_eq!(state.foreground_imageset.as_deref(), Some("Hydrogen Alpha"));
    assert_eq!(
        state.background_imageset.as_deref(),
        Some("Digitized Sky Survey (Color)")
    );
    assert_eq!(state.foreground_opacity, 0.25);
}

#[tokio::test]
async fn test_commands_reach_engine_in_order() {
    let (engine, facade) = setup();

    facade.apply_setting(&EngineSetting::ShowGrid(true)).unwrap();
    facade.set_clock_rate(100.0);
    facade.set_clock_sync(false);
    facade.toggle_tour_play_pause();
    facade.stop_tour();

    assert_eq!(
        engine.commands(),
        vec![
            EngineCommand::ApplySetting(EngineSetting::ShowGrid(true)),
            EngineCommand::SetClockRate(100.0),
            EngineCommand::SetClockSync(false),
            EngineCommand::ToggleTour,
            EngineCommand::StopTour,
        ]
    );
    let state = facade.state().engine;
    assert_eq!(state.clock_rate, 100.0);
    assert!(!state.clock_synced);
}

#[tokio::test]
async fn test_frame_loop_drives_pending_work() {
    let (engine, facade) = setup();

    let frames = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(5));
            for _ in 0..20 {
                ticker.tick().await;
                engine.fire_ready();
                engine.step();
            }
        })
    };

    facade.wait_for_ready().await.unwrap();
    facade
        .goto_ra_dec_zoom(GotoRaDecZoom::from_degrees(45.0, -10.0, 3.0, false))
        .await
        .unwrap();
    let tour = facade
        .load_tour(LoadTour::new("orion.wtt").playing())
        .await
        .unwrap();

    assert_eq!(tour.run_time_secs, 12.0);
    assert_eq!(facade.state().engine.zoom_deg, 18.0);
    assert!(facade.state().engine.is_tour_playing);

    frames.await.unwrap();
}
