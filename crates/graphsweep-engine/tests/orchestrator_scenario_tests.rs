#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use common::{config, descriptors, registry, run_to_end, World};
use graphsweep_core::{Addon, CollectionStrategy, ExErrorKind, MemorySnapshotService, Value};
use graphsweep_engine::{
    BlockedRemoval, CleanupContext, CleanupOrchestrator, MessageLevel, RecordingProgress,
    RunOutcome, RunState, SubPhase,
};

fn orchestrator(
    config: graphsweep_core::RunConfig,
    registry: graphsweep_core::AddonRegistry,
    service: MemorySnapshotService,
    progress: &RecordingProgress,
) -> CleanupOrchestrator<MemorySnapshotService> {
    let context = CleanupContext::new(registry, descriptors(), service)
        .with_config(config)
        .with_progress(progress.clone());
    CleanupOrchestrator::new(context)
}

#[test]
fn test_nothing_to_clean_completes_and_drops_backup() {
    let mut w = World::with_heroes(&[true, true]);
    let original = w.heap.clone();
    let progress = RecordingProgress::new();
    let config = config();
    let mut o = orchestrator(config.clone(), registry(&config), MemorySnapshotService::new(), &progress);

    o.start().unwrap();
    run_to_end(&mut o, &mut w.heap);

    let report = o.report().unwrap();
    assert_eq!(report.outcome, RunOutcome::NothingToClean);
    assert_eq!(report.removed, 0);
    assert_eq!(
        o.snapshot_service().requested(),
        &["before_cleaning_world_0".to_string()]
    );
    assert_eq!(
        o.snapshot_service().deleted(),
        &["before_cleaning_world_0".to_string()]
    );
    assert!(report.snapshots.kept().is_empty());
    assert_eq!(w.heap, original);

    let info = progress.messages(MessageLevel::Info);
    assert!(info.iter().any(|m| m == "Nothing to clean"));
    assert!(info.iter().any(|m| m.starts_with("Clean complete.")));
    assert!(!progress.is_active());
}

#[test]
fn test_second_start_rejected_without_state_change() {
    let mut w = World::with_heroes(&[false]);
    let progress = RecordingProgress::new();
    let config = config();
    let mut o = orchestrator(config.clone(), registry(&config), MemorySnapshotService::new(), &progress);

    o.start().unwrap();
    o.tick(&mut w.heap);
    let before = (o.state(), o.sub_phase());

    let err = o.start().unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::AlreadyRunning);
    assert_eq!(err.run_id(), Some(&o.run_context().run_id));
    assert_eq!((o.state(), o.sub_phase()), before);

    run_to_end(&mut o, &mut w.heap);
    assert_eq!(o.start().unwrap_err().kind(), ExErrorKind::AlreadyRunning);
}

#[test]
fn test_failed_backup_fails_run_without_mutation() {
    let mut w = World::with_heroes(&[false, true]);
    let original = w.heap.clone();
    let mut service = MemorySnapshotService::new();
    service.fail_prefix("before_");
    let progress = RecordingProgress::new();
    let config = config();
    let mut o = orchestrator(config.clone(), registry(&config), service, &progress);

    o.start().unwrap();
    run_to_end(&mut o, &mut w.heap);

    let report = o.report().unwrap();
    assert_eq!(
        report.outcome,
        RunOutcome::Failed {
            reason: "Snapshot before_cleaning_world_0 failed".to_string()
        }
    );
    assert_eq!(w.heap, original);
    assert!(report.snapshots.backup.is_none());
    assert_eq!(o.snapshot_service().requested().len(), 1);
    assert_eq!(
        progress.messages(MessageLevel::Error),
        vec!["Clean terminated: Snapshot before_cleaning_world_0 failed".to_string()]
    );
    // no backup exists, so there is nothing to advise loading
    assert!(progress.messages(MessageLevel::Warning).is_empty());
}

#[test]
fn test_full_clean_removes_detached_heroes() {
    let mut w = World::with_heroes(&[true, false, false]);
    let alive = w.hero_list()[0];
    let dead = w.hero_list()[1];
    let progress = RecordingProgress::new();
    let config = config();
    let mut o = orchestrator(config.clone(), registry(&config), MemorySnapshotService::new(), &progress);

    o.start().unwrap();
    run_to_end(&mut o, &mut w.heap);

    let report = o.report().unwrap().clone();
    assert_eq!(report.outcome, RunOutcome::Cleaned);
    assert_eq!(report.removed, 2);
    assert_eq!(report.by_addon.get("graphsweep"), Some(&2));
    assert_eq!(report.delta.get("Hero"), Some(&2));
    assert_eq!(report.delta_total(), report.removed as i64);
    assert_eq!(w.hero_list(), vec![alive]);
    assert!(w.heap.lookup_named("hero.1").is_none());
    assert!(w.heap.lookup_named("hero.0").is_some());

    let service = o.snapshot_service();
    assert_eq!(
        service.requested(),
        &[
            "before_cleaning_world_0".to_string(),
            "after_cleaning_world_0".to_string()
        ]
    );
    assert!(service.deleted().is_empty());
    assert_eq!(service.saved_heap("after_cleaning_world_0"), Some(&w.heap));
    let backup = service.saved_heap("before_cleaning_world_0").unwrap();
    assert_eq!(backup.lookup_named("hero.1"), Some(dead));
    assert_eq!(
        report.snapshots.kept(),
        vec!["before_cleaning_world_0", "after_cleaning_world_0"]
    );

    let warnings = progress.messages(MessageLevel::Warning);
    assert_eq!(
        warnings,
        vec!["Load snapshot after_cleaning_world_0 before continuing".to_string()]
    );
    assert!(progress
        .messages(MessageLevel::Info)
        .contains(&"Cleaned 2 objects".to_string()));
}

#[test]
fn test_wipe_run_takes_temporary_snapshot_and_deletes_it() {
    let mut w = World::with_heroes(&[true]);
    let banner_ty = w.heap.intern_type("World.Banners", "Banner");
    let banner = w.heap.alloc(banner_ty, graphsweep_core::Body::Record(vec![]));
    w.heap.set_field(w.world, "banner", Value::Ref(banner)).unwrap();

    let config = config();
    let mut addons = registry(&config);
    addons.register(
        "mod_banners",
        Addon::builder("banners", "Banners")
            .on_wipe(|ctx| {
                let Some(world) = ctx.heap.lookup_named("world") else {
                    return false;
                };
                ctx.heap.set_field(world, "banner", Value::Null).is_ok()
            })
            .build(),
    );

    let progress = RecordingProgress::new();
    let context = CleanupContext::new(addons, descriptors(), MemorySnapshotService::new())
        .with_config(config)
        .with_progress(progress.clone())
        .wiping("banners");
    let mut o = CleanupOrchestrator::new(context);
    o.start().unwrap();
    run_to_end(&mut o, &mut w.heap);

    let report = o.report().unwrap();
    assert_eq!(report.action, "wiping_banners");
    assert_eq!(report.outcome, RunOutcome::NothingToClean);
    let service = o.snapshot_service();
    assert_eq!(
        service.requested(),
        &[
            "before_wiping_banners_world_0".to_string(),
            "temp_wiping_banners_world_0".to_string(),
            "after_wiping_banners_world_0".to_string(),
        ]
    );
    assert_eq!(service.deleted(), &["temp_wiping_banners_world_0".to_string()]);
    assert!(service.saved_heap("temp_wiping_banners_world_0").is_none());
    assert_eq!(
        report.snapshots.kept(),
        vec!["before_wiping_banners_world_0", "after_wiping_banners_world_0"]
    );

    let backup = service.saved_heap("before_wiping_banners_world_0").unwrap();
    assert_eq!(backup.get(w.world).unwrap().field("banner"), Some(&Value::Ref(banner)));
    assert_eq!(w.heap.get(w.world).unwrap().field("banner"), Some(&Value::Null));
}

#[test]
fn test_wipe_target_must_exist_and_wipe() {
    let config = config();
    let context = CleanupContext::new(registry(&config), descriptors(), MemorySnapshotService::new())
        .with_config(config.clone())
        .wiping("ghost");
    let mut o = CleanupOrchestrator::new(context);
    assert_eq!(o.start().unwrap_err().kind(), ExErrorKind::AddonNotFound);
    assert_eq!(o.state(), RunState::None);

    let context = CleanupContext::new(registry(&config), descriptors(), MemorySnapshotService::new())
        .with_config(config)
        .wiping("graphsweep");
    let mut o = CleanupOrchestrator::new(context);
    assert_eq!(o.start().unwrap_err().kind(), ExErrorKind::InvalidInput);
    assert_eq!(o.state(), RunState::None);
}

#[test]
fn test_compatibility_mode_reports_blocked_removals() {
    let mut w = World::with_heroes(&[false, true]);
    let dead = w.hero_list()[0];
    let original = w.heap.clone();
    let mut config = config();
    config.compatibility_mode = true;
    let progress = RecordingProgress::new();
    let mut o = orchestrator(config.clone(), registry(&config), MemorySnapshotService::new(), &progress);

    o.start().unwrap();
    run_to_end(&mut o, &mut w.heap);

    let report = o.report().unwrap();
    assert_eq!(report.outcome, RunOutcome::NothingToClean);
    assert_eq!(
        report.blocked,
        vec![BlockedRemoval {
            object: dead,
            ancestor: w.world
        }]
    );
    assert_eq!(w.heap, original);
}

#[test]
fn test_pre_clean_failure_still_runs_post_clean() {
    let mut w = World::with_heroes(&[false]);
    let original = w.heap.clone();
    let post_cleaned = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&post_cleaned);

    let config = config();
    let mut addons = registry(&config);
    addons.register(
        "mod_flaky",
        Addon::builder("flaky", "Flaky")
            .on_pre_clean(|_| false)
            .on_post_clean(move |_| {
                flag.store(true, Ordering::SeqCst);
                true
            })
            .build(),
    );
    let progress = RecordingProgress::new();
    let mut o = orchestrator(config, addons, MemorySnapshotService::new(), &progress);

    o.start().unwrap();
    run_to_end(&mut o, &mut w.heap);

    assert_eq!(
        o.report().unwrap().outcome,
        RunOutcome::Failed {
            reason: "PreClean failed by addons: [flaky]".to_string()
        }
    );
    assert!(post_cleaned.load(Ordering::SeqCst));
    assert_eq!(w.heap, original);
    assert_eq!(
        progress.messages(MessageLevel::Warning),
        vec!["Load the backup snapshot before_cleaning_world_0 before continuing".to_string()]
    );
}

#[test]
fn test_removal_handler_failure_is_fatal() {
    let mut w = World::with_heroes(&[false, true]);
    let post_clean_runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&post_clean_runs);

    let config = config();
    let mut addons = registry(&config);
    addons.register(
        "mod_liar",
        Addon::builder("liar", "Liar")
            .authority("World")
            .unwrap()
            .remove_child(|_, _| true, |_, _, _| false)
            .on_post_clean(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .build(),
    );
    let progress = RecordingProgress::new();
    let mut o = orchestrator(config, addons, MemorySnapshotService::new(), &progress);

    o.start().unwrap();
    run_to_end(&mut o, &mut w.heap);

    let report = o.report().unwrap();
    assert!(report.outcome.is_failure());
    assert_eq!(report.removed, 0);
    assert_eq!(report.snapshots.backup.as_deref(), Some("before_cleaning_world_0"));
    assert!(o.snapshot_service().deleted().is_empty());
    assert_eq!(post_clean_runs.load(Ordering::SeqCst), 1);
    assert_eq!(o.state(), RunState::Complete);
}

/// Post-clean counter registered under `mod_counter`
fn counting_addon(runs: &Arc<AtomicUsize>) -> Addon {
    let counter = Arc::clone(runs);
    Addon::builder("counter", "Counter")
        .on_post_clean(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })
        .build()
}

#[test]
fn test_failed_closing_snapshot_keeps_backup() {
    let mut w = World::with_heroes(&[false, true]);
    let post_clean_runs = Arc::new(AtomicUsize::new(0));
    let config = config();
    let mut addons = registry(&config);
    addons.register("mod_counter", counting_addon(&post_clean_runs));
    let mut service = MemorySnapshotService::new();
    service.fail_prefix("after_");
    let progress = RecordingProgress::new();
    let mut o = orchestrator(config, addons, service, &progress);

    o.start().unwrap();
    run_to_end(&mut o, &mut w.heap);

    let report = o.report().unwrap();
    assert_eq!(
        report.outcome,
        RunOutcome::Failed {
            reason: "Snapshot after_cleaning_world_0 failed".to_string()
        }
    );
    assert_eq!(report.removed, 1);
    assert_eq!(report.snapshots.backup.as_deref(), Some("before_cleaning_world_0"));
    assert_eq!(report.snapshots.finish, None);
    assert_eq!(report.snapshots.kept(), vec!["before_cleaning_world_0"]);
    assert!(o.snapshot_service().deleted().is_empty());
    assert_eq!(post_clean_runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        progress.messages(MessageLevel::Warning),
        vec!["Load the backup snapshot before_cleaning_world_0 before continuing".to_string()]
    );
}

#[test]
fn test_failed_closing_snapshot_of_wipe_keeps_temporary() {
    let mut w = World::with_heroes(&[true]);
    let post_clean_runs = Arc::new(AtomicUsize::new(0));
    let config = config();
    let mut addons = registry(&config);
    addons.register("mod_counter", counting_addon(&post_clean_runs));
    addons.register(
        "mod_banners",
        Addon::builder("banners", "Banners").on_wipe(|_| true).build(),
    );
    let mut service = MemorySnapshotService::new();
    service.fail_prefix("after_");
    let progress = RecordingProgress::new();
    let context = CleanupContext::new(addons, descriptors(), service)
        .with_config(config)
        .with_progress(progress.clone())
        .wiping("banners");
    let mut o = CleanupOrchestrator::new(context);

    o.start().unwrap();
    run_to_end(&mut o, &mut w.heap);

    let report = o.report().unwrap();
    assert!(report.outcome.is_failure());
    assert_eq!(
        report.snapshots.kept(),
        vec!["before_wiping_banners_world_0", "temp_wiping_banners_world_0"]
    );
    assert!(o.snapshot_service().deleted().is_empty());
    assert_eq!(post_clean_runs.load(Ordering::SeqCst), 1);
    assert!(progress
        .messages(MessageLevel::Warning)
        .contains(&"Temporary snapshot temp_wiping_banners_world_0 was kept".to_string()));
}

#[test]
fn test_held_snapshot_completion_pauses_the_run() {
    let mut w = World::with_heroes(&[false]);
    let progress = RecordingProgress::new();
    let config = config();
    let mut o = orchestrator(config.clone(), registry(&config), MemorySnapshotService::holding(), &progress);

    o.start().unwrap();
    for _ in 0..20 {
        o.tick(&mut w.heap);
    }
    assert_eq!((o.state(), o.sub_phase()), (RunState::BackingUp, SubPhase::Started));
    assert_eq!(w.hero_list().len(), 1);

    assert_eq!(o.snapshot_service_mut().release_pending(), 1);
    o.snapshot_service_mut().set_hold(false);
    run_to_end(&mut o, &mut w.heap);

    assert_eq!(o.report().unwrap().outcome, RunOutcome::Cleaned);
    assert!(w.hero_list().is_empty());
}

#[test]
fn test_inline_and_full_strategies_clean_identically() {
    let alive = [true, false, true, false, false];
    let mut outcomes = Vec::new();
    for strategy in [CollectionStrategy::Full, CollectionStrategy::Inline] {
        let mut w = World::with_heroes(&alive);
        let mut config = config();
        config.collection_strategy = strategy;
        let progress = RecordingProgress::new();
        let mut o = orchestrator(config.clone(), registry(&config), MemorySnapshotService::new(), &progress);

        o.start().unwrap();
        run_to_end(&mut o, &mut w.heap);
        let report = o.report().unwrap();
        outcomes.push((w.heap, report.removed, report.delta.clone()));
    }
    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[0].1, 3);
}

#[test]
fn test_completed_run_is_idempotent() {
    let mut w = World::with_heroes(&[false]);
    let progress = RecordingProgress::new();
    let config = config();
    let mut o = orchestrator(config.clone(), registry(&config), MemorySnapshotService::new(), &progress);

    o.start().unwrap();
    run_to_end(&mut o, &mut w.heap);
    let report = o.report().unwrap().clone();
    let heap = w.heap.clone();
    let events = progress.events().len();

    for _ in 0..5 {
        o.tick(&mut w.heap);
    }
    assert!(o.completed());
    assert_eq!(o.report(), Some(&report));
    assert_eq!(w.heap, heap);
    assert_eq!(progress.events().len(), events);
}
