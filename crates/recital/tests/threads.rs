#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use assert_matches::assert_matches;
use recital::{
    NarrationError, NarrationOptions, NarrationQuery, NarrationRegistry, OptionsUpdate, ThreadKey,
};

fn fail_in(registry: &NarrationRegistry, text: &'static str) {
    let out: anyhow::Result<()> = registry
        .narrate("worker loop")
        .call(|| registry.narrate(text).call(|| Err(anyhow::anyhow!("worker failed"))));
    assert!(out.is_err());
}

#[test]
fn narration_is_per_thread() {
    let registry = Arc::new(NarrationRegistry::new());
    let worker = {
        let registry = Arc::clone(&registry);
        thread::Builder::new()
            .name("per-thread-worker".into())
            .spawn(move || fail_in(&registry, "processing job 1"))
            .unwrap()
    };
    let worker_id = worker.thread().id();
    worker.join().unwrap();

    assert!(registry.get_narration(&NarrationQuery::new()).unwrap().is_empty());
    assert_eq!(registry.depth(worker_id).unwrap(), 2);
}

#[test]
fn another_thread_is_readable_by_name_and_id() {
    let registry = Arc::new(NarrationRegistry::new());
    let worker = {
        let registry = Arc::clone(&registry);
        thread::Builder::new()
            .name("named-worker".into())
            .spawn(move || fail_in(&registry, "processing job 2"))
            .unwrap()
    };
    let handle_thread = worker.thread().clone();
    worker.join().unwrap();

    let by_name = registry
        .get_narration(&NarrationQuery::new().thread("named-worker"))
        .unwrap();
    let by_id = registry
        .get_narration(&NarrationQuery::new().thread(&handle_thread))
        .unwrap();
    assert_eq!(by_name, by_id);
    assert_eq!(by_name.len(), 2);
    assert_eq!(by_name[0], "worker loop");
    assert!(by_name[1].contains("worker failed"));

    let copies = registry.copy_narration(&handle_thread, false).unwrap();
    assert_eq!(copies.len(), 2);
}

#[test]
fn unknown_thread_name_is_rejected() {
    let registry = NarrationRegistry::new();
    assert_matches!(
        registry.get_narration(&NarrationQuery::new().thread("no-such-thread")),
        Err(NarrationError::InvalidThread { ref thread }) if thread == "no-such-thread"
    );
    assert_matches!(
        registry.reset("no-such-thread", false),
        Err(NarrationError::InvalidThread { .. })
    );
    assert_matches!(
        registry.set_narration_options("no-such-thread", OptionsUpdate::new().verbose(true)),
        Err(NarrationError::InvalidThread { .. })
    );
    assert_matches!(
        registry.copy_narration("no-such-thread", true),
        Err(NarrationError::InvalidThread { .. })
    );
}

#[test]
fn unseen_thread_id_reads_empty() {
    let registry = NarrationRegistry::new();
    let other = thread::spawn(|| thread::current().id()).join().unwrap();
    assert!(registry.copy_narration(other, false).unwrap().is_empty());
    assert_eq!(registry.depth(other).unwrap(), 0);
    registry.reset(other, true).unwrap();
}

#[test]
fn defaults_apply_to_stores_created_later() {
    let registry = Arc::new(NarrationRegistry::new());
    let _ = registry
        .set_narration_options(ThreadKey::Current, OptionsUpdate::new())
        .unwrap();

    let updated = registry.set_default_options(OptionsUpdate::new().auto_prune(false).verbose(true));
    assert!(!updated.auto_prune && updated.verbose);
    assert_eq!(
        registry.narration_options(ThreadKey::Current).unwrap(),
        NarrationOptions::default()
    );

    let spawned = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            let _: anyhow::Result<()> = registry.narrate("kept").call(|| Ok(()));
            registry.narration_options(ThreadKey::Current).unwrap()
        })
        .join()
        .unwrap()
    };
    assert_eq!(spawned, updated);
}

#[test]
fn options_can_be_set_for_another_thread() {
    let registry = Arc::new(NarrationRegistry::new());
    let (ready_tx, ready_rx) = mpsc::channel();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let worker = {
        let registry = Arc::clone(&registry);
        thread::Builder::new()
            .name("configured-worker".into())
            .spawn(move || {
                let _ = registry.set_narration_options(ThreadKey::Current, OptionsUpdate::new());
                ready_tx.send(()).unwrap();
                go_rx.recv().unwrap();
                let _: anyhow::Result<()> = registry.narrate("kept after success").call(|| Ok(()));
            })
            .unwrap()
    };
    ready_rx.recv().unwrap();
    let options = registry
        .set_narration_options("configured-worker", OptionsUpdate::new().auto_prune(false))
        .unwrap();
    assert!(!options.auto_prune);
    go_tx.send(()).unwrap();
    worker.join().unwrap();

    let texts = registry
        .get_narration(&NarrationQuery::new().thread("configured-worker"))
        .unwrap();
    assert_eq!(texts, vec!["kept after success".to_string()]);
}

#[test]
fn exited_threads_with_nothing_to_tell_are_evicted() {
    let registry = Arc::new(NarrationRegistry::new());
    let workers: Vec<_> = (0..50)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let out: anyhow::Result<u32> = registry.narrate("short task").call(|| Ok(i));
                out.unwrap()
            })
        })
        .collect();
    for worker in workers {
        let _ = worker.join().unwrap();
    }
    assert_eq!(registry.thread_count(), 0);
}

#[test]
fn exited_thread_narration_stays_until_reset_all() {
    let registry = Arc::new(NarrationRegistry::new());
    let _ = registry
        .set_narration_options(ThreadKey::Current, OptionsUpdate::new())
        .unwrap();
    let worker = {
        let registry = Arc::clone(&registry);
        thread::Builder::new()
            .name("exiting-worker".into())
            .spawn(move || {
                for _ in 0..5 {
                    let _: anyhow::Result<()> = registry.narrate("warm pool").call(|| Ok(()));
                }
                fail_in(&registry, "last job");
            })
            .unwrap()
    };
    worker.join().unwrap();

    assert_eq!(registry.thread_count(), 2);
    assert_eq!(registry.depth("exiting-worker").unwrap(), 2);

    registry.reset_all();
    assert_eq!(registry.thread_count(), 1);
    assert_matches!(
        registry.depth("exiting-worker"),
        Err(NarrationError::InvalidThread { .. })
    );
}

#[test]
fn store_created_by_id_learns_thread_name() {
    let registry = Arc::new(NarrationRegistry::new());
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let worker = {
        let registry = Arc::clone(&registry);
        thread::Builder::new()
            .name("adopted-worker".into())
            .spawn(move || {
                go_rx.recv().unwrap();
                fail_in(&registry, "adopted job");
            })
            .unwrap()
    };
    let options = registry
        .set_narration_options(worker.thread().id(), OptionsUpdate::new().check(true))
        .unwrap();
    assert!(options.check);
    assert_matches!(
        registry.depth("adopted-worker"),
        Err(NarrationError::InvalidThread { .. })
    );
    go_tx.send(()).unwrap();
    worker.join().unwrap();

    assert!(registry.narration_options("adopted-worker").unwrap().check);
    let texts = registry
        .get_narration(&NarrationQuery::new().thread("adopted-worker"))
        .unwrap();
    assert_eq!(texts.len(), 2);
}

#[test]
fn reset_all_clears_every_thread_but_keeps_options() {
    let registry = Arc::new(NarrationRegistry::new());
    let _ = registry
        .set_narration_options(ThreadKey::Current, OptionsUpdate::new().check(true))
        .unwrap();
    let workers: Vec<_> = (0..3)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::Builder::new()
                .name(format!("reset-worker-{i}"))
                .spawn(move || fail_in(&registry, "job"))
                .unwrap()
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(registry.depth("reset-worker-1").unwrap(), 2);

    registry.reset_all();
    for i in 0..3 {
        assert_matches!(
            registry.depth(format!("reset-worker-{i}")),
            Err(NarrationError::InvalidThread { .. })
        );
    }
    assert_eq!(registry.depth(ThreadKey::Current).unwrap(), 0);
    assert!(registry.narration_options(ThreadKey::Current).unwrap().check);
}
