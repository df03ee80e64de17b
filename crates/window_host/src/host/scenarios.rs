//! End-to-end window lifecycles on the headless desktop

use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crate::actor::{ActorError, ActorState, ConstructionError, Ownership, WindowActor, BROADCAST_STATUS};
use crate::config::HostConfig;
use crate::host::{HostError, HostServices, WindowHost};
use crate::platform::{ContentError, HeadlessDesktop, ShowHint, WindowId};

const WAIT: Duration = Duration::from_secs(5);

fn headless_host() -> (WindowHost, HeadlessDesktop) {
    let desktop = HeadlessDesktop::new();
    let host = WindowHost::headless(HostConfig::default(), &desktop);
    (host, desktop)
}

/// Poll `check` until it holds or the wait runs out
fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    check()
}

fn actor_for(services: &HostServices, window: WindowId) -> Option<Arc<WindowActor>> {
    services
        .registry()
        .snapshot()
        .into_iter()
        .find(|actor| actor.window_id() == Some(window))
}

fn open_first(host: &WindowHost, desktop: &HeadlessDesktop) -> WindowId {
    host.start(ShowHint::Normal).unwrap();
    assert!(desktop.wait_for_open(1, WAIT));
    let window = desktop.open_windows()[0];
    assert!(eventually(|| host.services().gate().count() == 1));
    window
}

#[test]
fn test_secondary_press_spawns_and_broadcasts() {
    let (host, desktop) = headless_host();
    let services = Arc::clone(host.services());

    let first = open_first(&host, &desktop);
    assert_eq!(services.registry().len(), 1);
    assert_eq!(desktop.status(first).as_deref(), Some("Ready"));
    assert_eq!(desktop.shown(first), Some(ShowHint::Normal));

    desktop.press(first, true).unwrap();
    assert!(desktop.wait_for_open(2, WAIT));
    assert!(eventually(|| services.gate().count() == 2));
    assert_eq!(services.registry().len(), 2);
    assert!(eventually(|| desktop.status(first).as_deref() == Some(BROADCAST_STATUS)));

    let second = desktop
        .open_windows()
        .into_iter()
        .find(|window| *window != first)
        .unwrap();
    assert!(desktop.spec(second).unwrap().launched_by_secondary);
    assert!(!desktop.spec(first).unwrap().launched_by_secondary);
    assert_eq!(
        desktop.status(second).as_deref(),
        Some("Launched by secondary press")
    );

    desktop.close(first).unwrap();
    assert!(eventually(|| services.gate().count() == 1));
    assert_eq!(services.registry().len(), 1);
    assert!(eventually(|| desktop.content_closed(first) == Some(true)));

    desktop.close(second).unwrap();
    let report = host.wait().unwrap();
    assert_eq!(report.windows_shown, 2);
    assert!(report.is_clean());
    assert_eq!(services.gate().count(), 0);
    assert!(services.registry().is_empty());
}

#[test]
fn test_run_returns_after_last_window_closes() {
    let (host, desktop) = headless_host();

    let driver = {
        let desktop = desktop.clone();
        thread::spawn(move || {
            assert!(desktop.wait_for_open(1, WAIT));
            let window = desktop.open_windows()[0];
            desktop.close(window).unwrap();
        })
    };

    let report = host.run(ShowHint::Maximized).unwrap();
    driver.join().unwrap();
    assert_eq!(report.windows_shown, 1);
    assert!(report.is_clean());
}

#[test]
fn test_every_window_is_released() {
    let (host, desktop) = headless_host();
    let services = Arc::clone(host.services());
    let first = open_first(&host, &desktop);

    for open in 2..=6 {
        desktop.press(first, false).unwrap();
        assert!(desktop.wait_for_open(open, WAIT));
    }
    assert!(eventually(|| services.gate().count() == 6));

    let actors: Vec<Weak<WindowActor>> = services
        .registry()
        .snapshot()
        .iter()
        .map(Arc::downgrade)
        .collect();
    assert_eq!(actors.len(), 6);

    for window in desktop.open_windows() {
        desktop.close(window).unwrap();
    }
    let report = host.wait().unwrap();

    assert_eq!(report.windows_shown, 6);
    assert!(report.is_clean());
    assert!(services.registry().is_empty());
    assert_eq!(services.contexts().supervisor().tracked(), 0);
    assert!(actors.iter().all(|actor| actor.upgrade().is_none()));
}

#[test]
fn test_repeated_destroy_is_ignored() {
    let (host, desktop) = headless_host();
    let window = open_first(&host, &desktop);

    desktop.close(window).unwrap();
    desktop.close(window).unwrap();

    let report = host.wait().unwrap();
    assert_eq!(report.windows_shown, 1);
    assert!(report.is_clean());
    assert_eq!(host.services().gate().count(), 0);
}

#[test]
fn test_first_window_construction_failure_rolls_back() {
    let (host, desktop) = headless_host();
    desktop.fail_next_attach("no content host");

    let result = host.run(ShowHint::Normal);
    assert!(matches!(
        result,
        Err(HostError::Construction(ActorError::Construction {
            source: ConstructionError::Content(ContentError::AttachFailed { .. }),
            ..
        }))
    ));

    let services = host.services();
    assert!(services.registry().is_empty());
    assert_eq!(services.gate().count(), 0);
    assert_eq!(services.windows_shown(), 0);
    assert!(desktop.open_windows().is_empty());
}

#[test]
fn test_failed_sibling_leaves_survivors_intact() {
    let (host, desktop) = headless_host();
    let services = Arc::clone(host.services());
    let first = open_first(&host, &desktop);

    desktop.fail_next_window("out of handles");
    desktop.press(first, true).unwrap();

    // The broadcast still lands, and the gate settles back on the survivor.
    assert!(eventually(|| desktop.status(first).as_deref() == Some(BROADCAST_STATUS)));
    assert!(eventually(|| services.gate().count() == 1));
    assert_eq!(services.registry().len(), 1);
    assert_eq!(desktop.open_windows(), vec![first]);

    desktop.close(first).unwrap();
    assert!(matches!(
        host.wait(),
        Err(HostError::Construction(ActorError::Construction {
            source: ConstructionError::Window(_),
            ..
        }))
    ));
}

#[test]
fn test_resize_reaches_content() {
    let (host, desktop) = headless_host();
    let window = open_first(&host, &desktop);
    assert_eq!(desktop.content_size(window), Some((800, 600)));

    desktop.resize(window, 1024, 768).unwrap();
    assert!(eventually(|| desktop.content_size(window) == Some((1024, 768))));

    desktop.close(window).unwrap();
    host.wait().unwrap();
}

#[test]
fn test_scale_change_updates_status() {
    let (host, desktop) = headless_host();
    let window = open_first(&host, &desktop);
    let actor = actor_for(host.services(), window).unwrap();
    assert!(actor.is_host_visible());

    desktop.change_scale(window, 1.5, false).unwrap();
    assert!(eventually(|| desktop.status(window).as_deref() == Some("1.5")));
    assert_eq!(actor.status(), "1.5");
    assert!(!actor.is_host_visible());

    drop(actor);
    desktop.close(window).unwrap();
    host.wait().unwrap();
}

#[test]
fn test_rundown_failure_is_reported() {
    let (host, desktop) = headless_host();
    let window = open_first(&host, &desktop);

    desktop.fail_next_close("content stuck");
    desktop.close(window).unwrap();

    let report = host.wait().unwrap();
    assert!(!report.is_clean());
    assert_eq!(
        report.rundown_failures,
        vec![ContentError::CloseFailed(String::from("content stuck"))]
    );
    assert!(report.teardown_failures.is_empty());
}

#[test]
fn test_actor_state_follows_lifecycle() {
    let (host, desktop) = headless_host();
    let window = open_first(&host, &desktop);
    let actor = actor_for(host.services(), window).unwrap();

    assert_eq!(actor.state(), ActorState::Visible);
    assert_eq!(actor.ownership(), Ownership::ContextResident);
    assert!(actor.is_registered());
    assert!(!actor.launched_by_secondary());
    assert!(actor
        .dispatcher_queue()
        .name()
        .starts_with(&HostConfig::default().context.thread_name_prefix));

    desktop.close(window).unwrap();
    assert!(eventually(|| actor.state() == ActorState::ShuttingDownContext));
    assert!(!actor.is_registered());
    assert_eq!(actor.ownership(), Ownership::ContextQueue);

    // A late status write on a torn-down actor is refused, not a fault.
    assert!(!actor.set_status("late"));

    let report = host.wait().unwrap();
    assert!(report.is_clean());
    let weak = Arc::downgrade(&actor);
    drop(actor);
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_broadcast_skips_closed_windows() {
    let (host, desktop) = headless_host();
    let services = Arc::clone(host.services());
    let first = open_first(&host, &desktop);
    desktop.press(first, false).unwrap();
    assert!(desktop.wait_for_open(2, WAIT));
    assert!(eventually(|| services.gate().count() == 2));

    let second = desktop
        .open_windows()
        .into_iter()
        .find(|window| *window != first)
        .unwrap();
    desktop.close(second).unwrap();
    assert!(eventually(|| services.registry().len() == 1));

    let report = services
        .broadcast(|actor: &WindowActor| {
            actor.set_status("hello");
        })
        .wait_timeout(WAIT)
        .unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(desktop.status(first).as_deref(), Some("hello"));

    desktop.close(first).unwrap();
    host.wait().unwrap();
}

#[test]
fn test_show_is_bound_to_own_context() {
    let (host, desktop) = headless_host();
    let services = Arc::clone(host.services());

    let controller = services.contexts().spawn().unwrap();
    let context = controller.handle().clone();
    let actor = WindowActor::new(controller, Arc::clone(&services), false);
    assert!(matches!(
        actor.show(ShowHint::Normal),
        Err(ActorError::WrongContext { .. })
    ));

    let (tx, rx) = crossbeam_channel::bounded(1);
    {
        let actor = Arc::clone(&actor);
        context
            .post(move || {
                let first = actor.show(ShowHint::Normal);
                let second = actor.show(ShowHint::Normal);
                tx.send((first.is_ok(), second)).unwrap();
            })
            .unwrap();
    }
    let (first, second) = rx.recv_timeout(WAIT).unwrap();
    assert!(first);
    assert!(matches!(
        second,
        Err(ActorError::InvalidState {
            state: ActorState::Visible,
            ..
        })
    ));
    drop(actor);

    let window = desktop.open_windows()[0];
    desktop.close(window).unwrap();
    assert!(host.wait().unwrap().is_clean());
}

#[test]
fn test_closing_actor_is_already_deregistered() {
    let (host, desktop) = headless_host();
    let services = Arc::clone(host.services());
    let window = open_first(&host, &desktop);
    let actor = actor_for(&services, window).unwrap();
    assert!(actor.state().is_registered());

    desktop.hold_next_close();
    desktop.close(window).unwrap();
    assert!(eventually(|| desktop.held_closes() == 1));

    // Content rundown is pending: registry and gate were released first.
    assert_eq!(actor.state(), ActorState::ClosingContent);
    assert!(!actor.state().is_registered());
    assert!(!actor.is_registered());
    assert!(!services.registry().contains(&actor));
    assert_eq!(services.gate().count(), 0);

    desktop.finish_held_closes();
    assert!(eventually(|| actor.state() == ActorState::ShuttingDownContext));
    drop(actor);
    assert!(host.wait().unwrap().is_clean());
}

#[test]
fn test_repeated_open_close_cycles_do_not_leak() {
    let (host, desktop) = headless_host();
    let services = Arc::clone(host.services());
    let first = open_first(&host, &desktop);
    let gate_before = services.gate().count();
    let registry_before = services.registry().len();

    for _ in 0..10 {
        desktop.press(first, false).unwrap();
        assert!(desktop.wait_for_open(2, WAIT));
        assert!(eventually(|| services.gate().count() == gate_before + 1));
        assert_eq!(services.registry().len(), registry_before + 1);

        let sibling = desktop
            .open_windows()
            .into_iter()
            .find(|window| *window != first)
            .unwrap();
        let released = Arc::downgrade(&actor_for(&services, sibling).unwrap());
        desktop.close(sibling).unwrap();

        assert!(eventually(|| services.gate().count() == gate_before));
        assert_eq!(services.registry().len(), registry_before);
        assert!(eventually(|| released.upgrade().is_none()));
    }

    desktop.close(first).unwrap();
    let report = host.wait().unwrap();
    assert_eq!(report.windows_shown, 11);
    assert!(report.is_clean());
    assert_eq!(services.contexts().supervisor().tracked(), 0);
}

#[test]
fn test_stalled_sibling_does_not_block_origin() {
    let (host, desktop) = headless_host();
    let services = Arc::clone(host.services());
    let first = open_first(&host, &desktop);
    let origin = actor_for(&services, first).unwrap().dispatcher_queue().clone();

    desktop.hold_next_window();
    desktop.press(first, true).unwrap();
    assert!(desktop.wait_for_held_window(WAIT));

    // The sibling is stuck in window creation; the origin keeps serving work.
    let (tx, rx) = crossbeam_channel::bounded(1);
    origin.post(move || tx.send(()).unwrap()).unwrap();
    assert!(rx.recv_timeout(WAIT).is_ok());
    assert_eq!(desktop.open_windows(), vec![first]);
    // First window, the pending spawn, and the sibling's own reference.
    assert_eq!(services.gate().count(), 3);

    desktop.release_held_window();
    assert!(desktop.wait_for_open(2, WAIT));
    for window in desktop.open_windows() {
        desktop.close(window).unwrap();
    }
    let report = host.wait().unwrap();
    assert_eq!(report.windows_shown, 2);
}

#[test]
fn test_broadcast_reaches_closing_target_harmlessly() {
    let (host, desktop) = headless_host();
    let services = Arc::clone(host.services());
    let first = open_first(&host, &desktop);
    desktop.press(first, false).unwrap();
    assert!(desktop.wait_for_open(2, WAIT));
    assert!(eventually(|| services.gate().count() == 2));

    let second = desktop
        .open_windows()
        .into_iter()
        .find(|window| *window != first)
        .unwrap();
    let closing = actor_for(&services, second).unwrap();

    // Park the second context so its destroy notice lands ahead of the hop.
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    closing
        .dispatcher_queue()
        .post(move || {
            let _ = release_rx.recv();
        })
        .unwrap();
    desktop.hold_next_close();
    desktop.close(second).unwrap();

    let outcomes: Arc<parking_lot::Mutex<Vec<(WindowId, ActorState, bool)>>> = Arc::default();
    let run = {
        let outcomes = Arc::clone(&outcomes);
        services.broadcast(move |actor: &WindowActor| {
            let state = actor.state();
            let written = actor.set_status(BROADCAST_STATUS);
            if let Some(window) = actor.window_id() {
                outcomes.lock().push((window, state, written));
            }
        })
    };
    assert_eq!(run.targets(), 2);
    release_tx.send(()).unwrap();

    let report = run.wait_timeout(WAIT).unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.skipped, 0);

    let outcomes = outcomes.lock().clone();
    assert!(outcomes.contains(&(first, ActorState::Visible, true)));
    assert!(outcomes.contains(&(second, ActorState::ClosingContent, false)));
    assert_eq!(desktop.status(second).as_deref(), Some("Ready"));

    desktop.finish_held_closes();
    drop(closing);
    desktop.close(first).unwrap();
    assert!(host.wait().unwrap().is_clean());
}
