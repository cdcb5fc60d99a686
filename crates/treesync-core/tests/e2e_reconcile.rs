/// End-to-end reconciliation tests.
///
/// Drive a real `TreeView` against an in-memory hierarchy that the tests
/// mutate behind the engine's back, the same way a filesystem or scene graph
/// changes underneath a live view. Full loads go through the scheduler and
/// the foreground queue exactly as in production; `ManualScheduler` lets a
/// test decide when (and in which order) background walks run.
mod common;

use common::*;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use treesync_core::{
    EngineContext, Filter, LoadOutcome, LoadPhase, NodeKind, Patch, Source, TreeConfig, TreeView, VisibleRow,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn loaded(config: TreeConfig) -> (Arc<MemSource>, TreeView<MemSource>) {
    let source = MemSource::new(sample_fs());
    let mut view = inline_view(Arc::clone(&source), config);
    load(&mut view, &source);
    (source, view)
}

fn manual() -> (Arc<MemSource>, Arc<ManualScheduler>, TreeView<MemSource>) {
    let source = MemSource::new(sample_fs());
    let scheduler = Arc::new(ManualScheduler::default());
    let view = TreeView::new(EngineContext::with_scheduler(
        Arc::clone(&source),
        scheduler.clone(),
        TreeConfig::default(),
    ));
    (source, scheduler, view)
}

fn child_names(view: &TreeView<MemSource>, path: &str) -> Vec<String> {
    let model = view.model();
    let idx = model.find(&p(path)).expect("parent must be in the tree");
    model
        .children(idx)
        .iter()
        .map(|&c| model.node(c).unwrap().name.to_string())
        .collect()
}

fn expanded_set(view: &TreeView<MemSource>) -> HashSet<PathBuf> {
    view.model().expanded_identities().into_iter().collect()
}

fn is_expanded(view: &TreeView<MemSource>, path: &str) -> bool {
    view.model().get(&p(path)).is_some_and(|n| n.expanded)
}

fn assert_valid(view: &TreeView<MemSource>) {
    if let Err(e) = view.model().validate() {
        panic!("tree invariant broken: {e}");
    }
}

// ── Full population ──────────────────────────────────────────────────────────

/// While a walk is pending the view shows exactly one placeholder row.
#[test]
fn fill_shows_placeholder_until_attach() {
    let (source, scheduler, mut view) = manual();
    let states = Arc::new(Mutex::new(Vec::new()));
    {
        let states = Arc::clone(&states);
        view.set_on_population_state_changed(move |loading| states.lock().push(loading));
    }

    view.fill(Arc::clone(&source));
    assert_eq!(view.phase(), LoadPhase::Populating);
    assert_eq!(view.visible_rows(), vec![VisibleRow::loading()]);
    assert_eq!(*states.lock(), vec![true]);

    scheduler.run_all();
    assert_eq!(view.pump(), 1);
    assert_eq!(view.phase(), LoadPhase::Idle);
    assert_eq!(*states.lock(), vec![true, false]);

    // Root is expanded after attach: root + a, c, img, readme.txt.
    assert_eq!(view.visible_rows().len(), 5);
    assert_eq!(view.model().len(), 9);
    assert_valid(&view);
}

#[test]
fn identity_is_stable_across_rebuilds() {
    let (_, first) = loaded(TreeConfig::default());
    let (_, second) = loaded(TreeConfig::default());
    assert_eq!(first.outline(), second.outline());

    let id = p("/r/a/b/d.txt");
    assert_eq!(
        first.model().get(&id).unwrap().identity,
        second.model().get(&id).unwrap().identity
    );
}

#[test]
fn refresh_is_idempotent() {
    let (_, mut view) = loaded(TreeConfig::default());
    view.mark_expanded(&p("/r/a"));
    let outline = view.outline();
    let expanded = expanded_set(&view);

    view.refresh();
    settle(&mut view);

    assert_eq!(view.outline(), outline);
    assert_eq!(expanded_set(&view), expanded);
}

#[test]
fn expanded_and_selected_survive_refresh() {
    let (source, mut view) = loaded(TreeConfig::default());
    assert!(view.expand_to(&p("/r/a/b/d.txt"), true));
    assert!(is_expanded(&view, "/r/a/b"));

    source.fs.touch("/r/a/b/e.txt");
    view.refresh();
    settle(&mut view);

    assert!(view.model().contains(&p("/r/a/b/e.txt")));
    assert!(is_expanded(&view, "/r/a/b"));
    assert!(is_expanded(&view, "/r/a"));
    assert_eq!(view.selected(), Some(&p("/r/a/b/d.txt")));

    // Identities that vanished are dropped silently.
    source.fs.remove("/r/a/b");
    view.refresh();
    settle(&mut view);
    assert!(!view.model().contains(&p("/r/a/b")));
    assert!(is_expanded(&view, "/r/a"));
    assert_eq!(view.selected(), None);
    assert!(view.preserver().is_empty());
}

#[test]
fn handle_remembered_expansion_survives_refresh() {
    let (_, mut view) = loaded(TreeConfig::default());
    view.handle().remember_expanded(p("/r/img"));
    assert!(!is_expanded(&view, "/r/img"), "applies at the next load only");

    view.refresh();
    settle(&mut view);
    assert!(is_expanded(&view, "/r/img"));
    assert!(view.preserver().is_empty());
    assert_valid(&view);
}

/// A result posted by an older fill/refresh must never replace a newer one.
#[test]
fn stale_generation_is_discarded() {
    let (source, scheduler, mut view) = manual();
    let outcomes: Arc<Mutex<Vec<LoadOutcome>>> = Arc::default();
    {
        let outcomes = Arc::clone(&outcomes);
        view.set_on_load_finished(move |o| outcomes.lock().push(o.clone()));
    }

    view.fill(Arc::clone(&source));
    scheduler.run(0); // walks the old hierarchy; attach is queued, not yet pumped
    source.fs.touch("/r/late.txt");
    view.refresh();
    assert_eq!(view.generation(), 2);
    scheduler.run(0);
    assert_eq!(scheduler.pending(), 0);

    settle(&mut view);
    assert!(view.model().contains(&p("/r/late.txt")));
    let outcomes = outcomes.lock();
    assert_eq!(outcomes.len(), 1, "only the current generation attaches");
    assert_eq!(outcomes[0].generation, 2);
    assert!(outcomes[0].success);
}

#[test]
fn failed_population_is_reported() {
    let source = MemSource::new(sample_fs());
    source.fail_root.store(true, Ordering::SeqCst);
    let mut view = inline_view(Arc::clone(&source), TreeConfig::default());
    let outcomes: Arc<Mutex<Vec<LoadOutcome>>> = Arc::default();
    let states = Arc::new(Mutex::new(Vec::new()));
    {
        let outcomes = Arc::clone(&outcomes);
        view.set_on_load_finished(move |o| outcomes.lock().push(o.clone()));
        let states = Arc::clone(&states);
        view.set_on_population_state_changed(move |loading| states.lock().push(loading));
    }

    load(&mut view, &source);
    {
        let outcomes = outcomes.lock();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].success);
        let error = outcomes[0].error.as_deref().unwrap_or_default();
        assert!(error.contains("tree root"), "got {error:?}");
    }
    assert_eq!(*states.lock(), vec![true, false]);
    assert!(view.model().is_empty());
    assert!(view.visible_rows().is_empty());
    assert!(!view.last_outcome().unwrap().success);

    source.fail_root.store(false, Ordering::SeqCst);
    view.refresh();
    settle(&mut view);
    assert!(view.last_outcome().unwrap().success);
    assert_eq!(view.model().len(), 9);
}

#[test]
fn worker_pool_loads_off_thread() {
    let source = MemSource::new(sample_fs());
    let config = TreeConfig {
        worker_threads: 2,
        ..TreeConfig::default()
    };
    let ctx = EngineContext::new(Arc::clone(&source), config).expect("worker pool");
    let mut view = TreeView::new(ctx);
    load(&mut view, &source);
    assert_eq!(view.model().len(), 9);
    assert_valid(&view);
}

#[test]
fn progress_reports_running_count() {
    let source = MemSource::new(sample_fs());
    let config = TreeConfig {
        progress_interval: 2,
        ..TreeConfig::default()
    };
    let mut view = inline_view(Arc::clone(&source), config);
    let reports = Arc::new(Mutex::new(Vec::new()));
    {
        let reports = Arc::clone(&reports);
        view.set_on_progress(move |n| reports.lock().push(n));
    }
    load(&mut view, &source);
    assert_eq!(*reports.lock(), vec![2, 4, 6, 8]);
}

#[test]
fn patches_during_load_are_ignored() {
    let (source, scheduler, mut view) = manual();
    view.fill(Arc::clone(&source));
    assert!(!view.apply(Patch::Deleted(p("/r/readme.txt"))));

    scheduler.run_all();
    settle(&mut view);
    assert!(view.model().contains(&p("/r/readme.txt")));
}

/// `expand_to` issued mid-load is remembered and honoured by the attach.
#[test]
fn expand_to_during_load_applies_on_attach() {
    let (source, scheduler, mut view) = manual();
    view.fill(Arc::clone(&source));
    assert!(!view.expand_to(&p("/r/a/b/d.txt"), true));
    assert_eq!(view.preserver().expanded_len(), 3);

    scheduler.run_all();
    settle(&mut view);
    assert!(is_expanded(&view, "/r/a/b"));
    assert!(is_expanded(&view, "/r/a"));
    assert_eq!(view.selected(), Some(&p("/r/a/b/d.txt")));
}

#[test]
fn expansion_count_is_reported_on_change() {
    let source = MemSource::new(sample_fs());
    let mut view = inline_view(Arc::clone(&source), TreeConfig::default());
    let counts = Arc::new(Mutex::new(Vec::new()));
    {
        let counts = Arc::clone(&counts);
        view.set_on_expansion_count_changed(move |n| counts.lock().push(n));
    }
    load(&mut view, &source);
    assert!(view.mark_expanded(&p("/r/a")));
    assert!(!view.mark_expanded(&p("/r/a")), "already expanded");
    assert!(view.collapse(&p("/r/a")));
    assert_eq!(*counts.lock(), vec![1, 2, 1]);

    view.expand_all();
    // Every node with children: /r, /r/a, /r/a/b, /r/img.
    assert_eq!(counts.lock().last(), Some(&4));
}

// ── Filtering ────────────────────────────────────────────────────────────────

#[test]
fn extension_filter_hides_folders_without_matches() {
    let config = TreeConfig {
        filter: Filter::with_extensions([".TXT"]),
        ..TreeConfig::default()
    };
    let (source, mut view) = loaded(config);
    assert!(!view.model().contains(&p("/r/img")), "only .png inside");
    assert!(!view.model().contains(&p("/r/c")), "empty folder");
    assert!(view.model().contains(&p("/r/a/b/d.txt")));
    assert_valid(&view);

    // Deleting the last match prunes the folder it leaves empty.
    source.fs.remove("/r/a/b/d.txt");
    assert!(view.apply(Patch::Deleted(p("/r/a/b/d.txt"))));
    assert!(!view.model().contains(&p("/r/a/b")));
    assert!(view.model().contains(&p("/r/a")), "still holds notes.txt");

    source.fs.touch("/r/a/pic.png");
    assert!(!view.apply(Patch::Created(p("/r/a/pic.png"))));
    assert_valid(&view);
}

#[test]
fn extension_filter_from_json_config() {
    let config = TreeConfig::from_json_str(r#"{ "filter": { "extensions": [".TXT"] } }"#).unwrap();
    let fs = sample_fs();
    fs.touch("/r/img/Caption.TXT");
    let source = MemSource::new(fs);
    let mut view = inline_view(Arc::clone(&source), config);
    load(&mut view, &source);

    assert!(view.model().contains(&p("/r/readme.txt")));
    assert!(view.model().contains(&p("/r/a/notes.txt")));
    assert_eq!(child_names(&view, "/r/img"), vec!["Caption.TXT"]);
    assert_valid(&view);

    let (_, unfiltered) = loaded(TreeConfig::from_json_str(r#"{ "filter": { "extensions": [] } }"#).unwrap());
    assert!(unfiltered.model().contains(&p("/r/c")), "no restriction, no pruning");
    assert!(unfiltered.model().contains(&p("/r/img/logo.png")));
}

#[test]
fn filter_setters_apply_at_next_refresh() {
    let (_, mut view) = loaded(TreeConfig::default());
    view.set_filter(["txt"]);
    assert!(view.model().contains(&p("/r/img")));

    view.refresh();
    settle(&mut view);
    assert!(!view.model().contains(&p("/r/img")));

    view.set_filter(Vec::<String>::new());
    view.set_containers_only(true);
    view.refresh();
    settle(&mut view);
    assert!(view.model().contains(&p("/r/img")));
    assert!(view.model().contains(&p("/r/c")));
    assert!(!view.model().contains(&p("/r/readme.txt")));
    assert!(view
        .model()
        .walk()
        .iter()
        .all(|&(idx, _)| view.model().node(idx).unwrap().kind == NodeKind::Container));
}

// ── Incremental patches ──────────────────────────────────────────────────────

#[test]
fn siblings_stay_sorted_after_every_patch() {
    let (source, mut view) = loaded(TreeConfig::default());
    let handle = view.handle();

    source.fs.touch("/r/Zeta.txt");
    handle.notify_created(p("/r/Zeta.txt"));
    settle(&mut view);
    assert_valid(&view);

    source.fs.mkdir("/r/B");
    handle.notify_created(p("/r/B"));
    settle(&mut view);
    assert_valid(&view);
    assert_eq!(
        child_names(&view, "/r"),
        ["a", "B", "c", "img", "readme.txt", "Zeta.txt"]
    );

    source.fs.rename("/r/readme.txt", "/r/a/readme.txt");
    handle.notify_moved(p("/r/readme.txt"), p("/r/a/readme.txt"));
    source.fs.rename("/r/c", "/r/zz");
    handle.notify_renamed(p("/r/c"), p("/r/zz"));
    source.fs.remove("/r/img");
    handle.notify_deleted(p("/r/img"));
    settle(&mut view);

    assert_valid(&view);
    assert_eq!(child_names(&view, "/r"), ["a", "B", "zz", "Zeta.txt"]);
    assert_eq!(child_names(&view, "/r/a"), ["b", "notes.txt", "readme.txt"]);
}

#[test]
fn created_then_deleted_round_trips() {
    let (source, mut view) = loaded(TreeConfig::default());
    let before = view.outline();

    source.fs.touch("/r/c/new.txt");
    assert!(view.apply(Patch::Created(p("/r/c/new.txt"))));
    assert!(view.model().contains(&p("/r/c/new.txt")));
    assert!(!view.apply(Patch::Created(p("/r/c/new.txt"))), "already present");

    source.fs.remove("/r/c/new.txt");
    assert!(view.apply(Patch::Deleted(p("/r/c/new.txt"))));
    assert_eq!(view.outline(), before);
    assert!(!view.apply(Patch::Deleted(p("/r/c/new.txt"))), "stale reference");
}

#[test]
fn created_builds_missing_ancestors() {
    let (source, mut view) = loaded(TreeConfig::default());
    source.fs.mkdir("/r/new");
    source.fs.mkdir("/r/new/deep");
    source.fs.touch("/r/new/deep/f.txt");
    source.fs.touch("/r/new/sibling.txt");

    assert!(view.apply(Patch::Created(p("/r/new/deep/f.txt"))));
    assert!(view.model().contains(&p("/r/new")));
    assert!(view.model().contains(&p("/r/new/deep")));
    assert!(view.model().contains(&p("/r/new/sibling.txt")));
    assert_valid(&view);

    assert!(!view.apply(Patch::Created(p("/r/ghost.txt"))), "source cannot resolve");
    assert!(!view.apply(Patch::Created(p("/elsewhere/x"))), "outside the root");
}

/// The `/a/b` to `/c/b` move from the design notes, with descendant `d.txt`.
#[test]
fn move_rewrites_descendant_identities() {
    let (source, mut view) = loaded(TreeConfig::default());
    view.mark_expanded(&p("/r/a/b"));
    view.select(Some(&p("/r/a/b/d.txt")));

    source.fs.rename("/r/a/b", "/r/c/b");
    assert!(view.apply(Patch::Moved {
        from: p("/r/a/b"),
        to: p("/r/c/b"),
    }));

    let model = view.model();
    assert!(model.contains(&p("/r/c/b/d.txt")));
    assert!(!model.contains(&p("/r/a/b/d.txt")));
    let moved = model.get(&p("/r/c/b/d.txt")).unwrap();
    assert_eq!(moved.element.path, p("/r/c/b/d.txt"));
    assert_eq!(model.node(moved.parent.unwrap()).unwrap().identity, p("/r/c/b"));
    assert_eq!(model.get(&p("/r/c")).unwrap().leaf_count, 1);
    assert_eq!(model.get(&p("/r/a")).unwrap().leaf_count, 1);
    assert!(is_expanded(&view, "/r/c/b"));
    assert_eq!(view.selected(), Some(&p("/r/c/b/d.txt")));
    assert_valid(&view);
}

#[test]
fn move_into_own_subtree_is_ignored() {
    let (_, mut view) = loaded(TreeConfig::default());
    let before = view.outline();
    assert!(!view.apply(Patch::Moved {
        from: p("/r/a"),
        to: p("/r/a/b/a"),
    }));
    assert!(!view.apply(Patch::Moved {
        from: p("/r/missing"),
        to: p("/r/c/missing"),
    }));
    assert_eq!(view.outline(), before);
}

#[test]
fn move_replaces_stale_node_at_destination() {
    let (source, mut view) = loaded(TreeConfig::default());
    // The destination already shows a leftover entry with the same name.
    source.fs.touch("/r/c/readme.txt");
    view.apply(Patch::Created(p("/r/c/readme.txt")));

    source.fs.rename("/r/readme.txt", "/r/c/readme.txt");
    assert!(view.apply(Patch::Moved {
        from: p("/r/readme.txt"),
        to: p("/r/c/readme.txt"),
    }));
    assert_eq!(child_names(&view, "/r/c"), ["readme.txt"]);
    assert_valid(&view);
}

#[test]
fn rename_resorts_and_keeps_expansion() {
    let (source, mut view) = loaded(TreeConfig::default());
    view.mark_expanded(&p("/r/a"));

    source.fs.rename("/r/a", "/r/zed");
    assert!(view.apply(Patch::Renamed {
        from: p("/r/a"),
        to: p("/r/zed"),
    }));
    assert_eq!(child_names(&view, "/r"), ["c", "img", "zed", "readme.txt"]);
    assert!(is_expanded(&view, "/r/zed"));
    assert!(view.model().contains(&p("/r/zed/b/d.txt")));
    assert_valid(&view);
}

#[test]
fn replaced_rebuilds_in_place_and_keeps_flags() {
    let (source, mut view) = loaded(TreeConfig::default());
    view.expand_to(&p("/r/a/b/d.txt"), true);
    source.fs.touch("/r/a/b/extra.txt");

    let fresh = source.resolve(&p("/r/a")).unwrap();
    assert!(view.apply(Patch::Replaced {
        parent: p("/r"),
        old: p("/r/a"),
        new: fresh,
    }));
    assert!(view.model().contains(&p("/r/a/b/extra.txt")));
    assert!(is_expanded(&view, "/r/a"));
    assert!(is_expanded(&view, "/r/a/b"));
    assert_eq!(view.selected(), Some(&p("/r/a/b/d.txt")));
    assert_valid(&view);

    let wrong_parent = source.resolve(&p("/r/c")).unwrap();
    assert!(!view.apply(Patch::Replaced {
        parent: p("/r/a"),
        old: p("/r/c"),
        new: wrong_parent,
    }));
}

#[test]
fn positional_add_and_remove() {
    let (source, mut view) = loaded(TreeConfig::default());
    source.fs.touch("/r/c/one.txt");
    source.fs.touch("/r/c/two.txt");

    let two = source.resolve(&p("/r/c/two.txt")).unwrap();
    assert!(view.apply(Patch::Added {
        parent: p("/r/c"),
        child: two,
        index: 0,
    }));
    let one = source.resolve(&p("/r/c/one.txt")).unwrap();
    assert!(view.apply(Patch::Added {
        parent: p("/r/c"),
        child: one,
        index: 7,
    }));
    // The index only breaks ties; names still decide.
    assert_eq!(child_names(&view, "/r/c"), ["one.txt", "two.txt"]);

    assert!(!view.apply(Patch::Removed {
        parent: p("/r"),
        child: p("/r/c/one.txt"),
    }));
    assert!(view.apply(Patch::Removed {
        parent: p("/r/c"),
        child: p("/r/c/one.txt"),
    }));
    assert_eq!(child_names(&view, "/r/c"), ["two.txt"]);
    assert_valid(&view);
}

/// Every structural edit notifies the parent before and after.
#[test]
fn prepare_and_commit_bracket_each_edit() {
    let (source, mut view) = loaded(TreeConfig::default());
    source.fs.hooks.lock().clear();

    source.fs.touch("/r/c/x.txt");
    assert!(view.apply(Patch::Created(p("/r/c/x.txt"))));
    {
        let hooks = source.fs.hooks.lock();
        assert_eq!(hooks.len(), 2);
        assert_eq!(hooks[0].container, p("/r/c"));
        assert_eq!(hooks[0].phase, "prepare");
        assert_eq!(hooks[0].state.child_count, 0);
        assert_eq!(hooks[1].phase, "commit");
        assert_eq!(hooks[1].state.child_count, 1);
        assert_eq!(hooks[1].state.leaf_count, 1);
    }
    assert_eq!(view.model().get(&p("/r")).unwrap().leaf_count, 5);

    source.fs.hooks.lock().clear();
    assert!(view.apply(Patch::Removed {
        parent: p("/r/c"),
        child: p("/r/c/x.txt"),
    }));
    let hooks = source.fs.hooks.lock();
    assert_eq!(hooks.len(), 2);
    assert_eq!(hooks[0].state.child_count, 1);
    assert_eq!(hooks[1].state.child_count, 0);
    assert_eq!(view.model().get(&p("/r")).unwrap().leaf_count, 4);
}

#[test]
fn deleting_the_selection_clears_it() {
    let (source, mut view) = loaded(TreeConfig::default());
    assert!(view.select(Some(&p("/r/readme.txt"))));
    source.fs.remove("/r/readme.txt");
    view.apply(Patch::Deleted(p("/r/readme.txt")));
    assert_eq!(view.selected(), None);
    assert!(!view.select(Some(&p("/r/readme.txt"))));
}

/// Notifications from another thread run in submission order.
#[test]
fn notifications_from_other_threads_apply_in_order() {
    let (source, mut view) = loaded(TreeConfig::default());
    source.fs.touch("/r/c/t.txt");
    let handle = view.handle();

    std::thread::spawn(move || {
        assert!(handle.notify_created(p("/r/c/t.txt")));
        assert!(handle.notify_deleted(p("/r/c/t.txt")));
    })
    .join()
    .unwrap();

    assert_eq!(view.pump(), 2);
    // Reversed order would have left the file in the tree.
    assert!(!view.model().contains(&p("/r/c/t.txt")));
}

#[test]
fn handle_outliving_view_reports_failure() {
    let (_, view) = loaded(TreeConfig::default());
    let handle = view.handle();
    drop(view);
    assert!(!handle.notify_deleted(p("/r/a")));
}
