use beach_touch_scroll::{
    Confidence, CopyMode, EntryIntent, ExitRequest, FixedGeometry, GestureState, NoSelection, Point,
    ScrollBatch, ScrollConfig, ScrollController, ScrollDirection, ScrollEvent, ScrollbackPhase,
};
use std::time::{Duration, Instant};

fn at(start: Instant, ms: u64) -> Instant {
    start + Duration::from_millis(ms)
}

fn linear(config: ScrollConfig) -> ScrollConfig {
    ScrollConfig {
        velocity_multiplier_enabled: false,
        backlog_multiplier_enabled: false,
        ..config
    }
}

fn batches(events: &[ScrollEvent]) -> Vec<ScrollBatch> {
    events
        .iter()
        .filter_map(|event| match event {
            ScrollEvent::ScrollBatch(batch) => Some(batch.clone()),
            _ => None,
        })
        .collect()
}

fn keystrokes(events: &[ScrollEvent]) -> Vec<Vec<u8>> {
    events
        .iter()
        .filter_map(|event| match event {
            ScrollEvent::RawKeystroke(keys) => Some(keys.as_bytes().to_vec()),
            _ => None,
        })
        .collect()
}

fn entry_requests(events: &[ScrollEvent]) -> Vec<(u64, EntryIntent)> {
    events
        .iter()
        .filter_map(|event| match event {
            ScrollEvent::EntryRequest(request) => Some((request.request_id, request.intent)),
            _ => None,
        })
        .collect()
}

/// Drags far enough to enter copy mode and acknowledges the entry.
fn enter_copy_mode<G, A>(controller: &mut ScrollController<G, A>, start: Instant, distance: f64)
where
    G: beach_touch_scroll::GeometryProvider,
    A: beach_touch_scroll::SelectionArbiter,
{
    controller.on_contact_down(1, Point::new(100.0, 100.0), start);
    controller.on_contact_move(1, Point::new(100.0, 100.0 + distance), at(start, 16));
    let requested = entry_requests(&controller.drain_events());
    assert_eq!(requested.len(), 1);
    controller.handle_entry_ack(requested[0].0, at(start, 20));
}

#[test]
fn drag_crosses_slop_then_scrolls_after_entry() {
    let start = Instant::now();
    let config = linear(ScrollConfig {
        slop_px: 15.0,
        ..ScrollConfig::default()
    });
    let mut controller = ScrollController::new(config, FixedGeometry::new(24, 12.0), NoSelection);
    assert_eq!(controller.px_per_line(), 12.0);

    controller.on_contact_down(7, Point::new(100.0, 500.0), start);
    controller.on_contact_move(7, Point::new(100.0, 510.0), at(start, 16));
    assert_eq!(controller.gesture_state(), GestureState::Tracking);
    assert!(controller.drain_events().is_empty());

    controller.on_contact_move(7, Point::new(100.0, 520.0), at(start, 32));
    assert_eq!(controller.gesture_state(), GestureState::Scrolling);
    let events = controller.drain_events();
    assert_eq!(entry_requests(&events), vec![(1, EntryIntent::Scroll)]);
    assert!(batches(&events).is_empty());
    assert_eq!(controller.copy_mode(), CopyMode::Entering { request_id: 1 });

    controller.handle_entry_ack(1, at(start, 40));
    assert_eq!(controller.copy_mode(), CopyMode::On);
    let sent = batches(&controller.drain_events());
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].direction, ScrollDirection::Up);
    assert_eq!(sent[0].total_lines(controller.page_step()), 1);
    controller.on_ack_signal(at(start, 44));

    controller.on_contact_move(7, Point::new(100.0, 530.0), at(start, 48));
    assert!(controller.poll_timer(at(start, 64)));
    let sent = batches(&controller.drain_events());
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].lines, 1);
    assert_eq!(sent[0].seq, 2);
}

#[test]
fn large_backlog_drains_in_capped_batches() {
    let start = Instant::now();
    let config = linear(ScrollConfig {
        px_per_line: Some(10.0),
        initial_rtt_ms: 50.0,
        max_pages_per_flush: 6,
        ..ScrollConfig::default()
    });
    let mut controller = ScrollController::new(config, FixedGeometry::new(40, 10.0), NoSelection);
    assert_eq!(controller.page_step(), 39);

    enter_copy_mode(&mut controller, start, 1200.0);
    let first = batches(&controller.drain_events());
    assert_eq!(first.len(), 1);
    assert_eq!((first[0].pages, first[0].lines), (2, 12));
    assert!((controller.rate_state().backlog() - 30.0).abs() < 1e-9);
    assert!(controller.next_deadline().is_some());

    let mut total = first[0].total_lines(39);
    let mut polls = 0;
    while let Some(deadline) = controller.next_deadline() {
        controller.poll_timer(deadline);
        total += batches(&controller.drain_events())
            .iter()
            .map(|batch| batch.total_lines(39))
            .sum::<u64>();
        polls += 1;
        assert!(polls < 32, "flush timer never settled");
    }
    assert_eq!(total, 120);
    assert_eq!(controller.rate_state().pending_whole_lines(), 0);
}

#[test]
fn cancel_mid_scroll_sends_nothing_further() {
    let start = Instant::now();
    let config = linear(ScrollConfig {
        px_per_line: Some(10.0),
        ..ScrollConfig::default()
    });
    let mut controller = ScrollController::with_defaults(config, 24);
    enter_copy_mode(&mut controller, start, 40.0);
    controller.on_contact_move(1, Point::new(100.0, 180.0), at(start, 30));
    controller.drain_events();
    assert!(controller.next_deadline().is_some());

    controller.on_contact_cancel(1, at(start, 35));
    assert_eq!(controller.gesture_state(), GestureState::ScrollbackActive);
    assert_eq!(controller.copy_mode(), CopyMode::On);
    assert_eq!(controller.next_deadline(), None);
    assert!(!controller.poll_timer(at(start, 500)));
    controller.flush(true, at(start, 500));

    let events = controller.drain_events();
    assert!(batches(&events).is_empty());
    assert!(keystrokes(&events).is_empty());
    assert!(events.contains(&ScrollEvent::ScrollbackModeChanged {
        active: true,
        phase: ScrollbackPhase::Active,
        request_id: None,
    }));
}

#[test]
fn cancel_after_entry_then_tap_stays_in_scrollback() {
    let start = Instant::now();
    let config = linear(ScrollConfig {
        px_per_line: Some(10.0),
        ..ScrollConfig::default()
    });
    let mut controller = ScrollController::with_defaults(config, 24);
    enter_copy_mode(&mut controller, start, 40.0);
    controller.on_contact_cancel(1, at(start, 30));
    let events = controller.drain_events();
    assert!(!events.iter().any(|event| matches!(
        event,
        ScrollEvent::ScrollbackModeChanged { active: false, .. }
    )));

    controller.on_contact_down(2, Point::new(0.0, 0.0), at(start, 100));
    controller.on_contact_up(2, at(start, 120));
    assert_eq!(controller.gesture_state(), GestureState::ScrollbackActive);
    assert!(controller.drain_events().is_empty());

    controller.exit_scrollback(
        ExitRequest {
            emit_exit: true,
            request_id: Some(3),
        },
        at(start, 200),
    );
    let events = controller.drain_events();
    assert_eq!(keystrokes(&events), vec![b"q".to_vec()]);
    assert!(events.contains(&ScrollEvent::ScrollbackModeChanged {
        active: false,
        phase: ScrollbackPhase::Inactive,
        request_id: Some(3),
    }));
}

#[test]
fn cancel_before_entry_ack_rests_idle_until_confirmed() {
    let start = Instant::now();
    let config = linear(ScrollConfig {
        px_per_line: Some(10.0),
        ..ScrollConfig::default()
    });
    let mut controller = ScrollController::with_defaults(config, 24);
    controller.on_contact_down(1, Point::new(0.0, 0.0), start);
    controller.on_contact_move(1, Point::new(0.0, 40.0), at(start, 16));
    assert_eq!(entry_requests(&controller.drain_events()).len(), 1);

    controller.on_contact_cancel(1, at(start, 20));
    assert_eq!(controller.gesture_state(), GestureState::Idle);
    assert!(controller.drain_events().contains(&ScrollEvent::ScrollbackModeChanged {
        active: false,
        phase: ScrollbackPhase::Inactive,
        request_id: None,
    }));

    controller.handle_entry_ack(1, at(start, 60));
    assert_eq!(controller.gesture_state(), GestureState::ScrollbackActive);
    let events = controller.drain_events();
    assert!(batches(&events).is_empty());
    assert!(events.contains(&ScrollEvent::ScrollbackModeChanged {
        active: true,
        phase: ScrollbackPhase::Active,
        request_id: Some(1),
    }));
}

#[test]
fn cancel_returns_to_scrollback_when_it_was_active() {
    let start = Instant::now();
    let config = linear(ScrollConfig {
        px_per_line: Some(10.0),
        ..ScrollConfig::default()
    });
    let mut controller = ScrollController::with_defaults(config, 24);
    enter_copy_mode(&mut controller, start, 40.0);
    controller.on_contact_up(1, at(start, 30));
    assert_eq!(controller.gesture_state(), GestureState::ScrollbackActive);
    controller.drain_events();

    controller.on_contact_down(2, Point::new(0.0, 0.0), at(start, 100));
    controller.on_contact_move(2, Point::new(0.0, 60.0), at(start, 116));
    assert_eq!(controller.gesture_state(), GestureState::Scrolling);
    controller.on_contact_cancel(2, at(start, 120));
    assert_eq!(controller.gesture_state(), GestureState::ScrollbackActive);
    let events = controller.drain_events();
    assert!(keystrokes(&events).is_empty());
    assert!(batches(&events).is_empty());
}

#[test]
fn key_binding_change_forces_recovery_exit() {
    let start = Instant::now();
    let config = linear(ScrollConfig {
        px_per_line: Some(10.0),
        ..ScrollConfig::default()
    });
    let mut controller = ScrollController::with_defaults(config.clone(), 24);
    enter_copy_mode(&mut controller, start, 40.0);
    controller.on_contact_up(1, at(start, 30));
    assert_eq!(controller.confidence(), Confidence::Confident);
    controller.drain_events();

    let mut rebound = config;
    rebound.keys.cancel_key = "C-c".to_string();
    controller.set_config(rebound);
    assert_eq!(controller.copy_mode(), CopyMode::On);
    assert_eq!(controller.confidence(), Confidence::Uncertain);

    controller.exit_scrollback(
        ExitRequest {
            emit_exit: true,
            request_id: Some(77),
        },
        at(start, 200),
    );
    let events = controller.drain_events();
    assert!(keystrokes(&events).is_empty());
    assert_eq!(entry_requests(&events), vec![(2, EntryIntent::Recovery)]);

    controller.handle_entry_ack(2, at(start, 260));
    let events = controller.drain_events();
    assert_eq!(keystrokes(&events), vec![vec![0x03]]);
    assert!(events.contains(&ScrollEvent::ScrollbackModeChanged {
        active: false,
        phase: ScrollbackPhase::Inactive,
        request_id: Some(2),
    }));
    assert_eq!(controller.copy_mode(), CopyMode::Off);
}

#[test]
fn confident_exit_sends_cancel_key_directly() {
    let start = Instant::now();
    let config = linear(ScrollConfig {
        px_per_line: Some(10.0),
        ..ScrollConfig::default()
    });
    let mut controller = ScrollController::with_defaults(config, 24);
    enter_copy_mode(&mut controller, start, 40.0);
    controller.on_contact_up(1, at(start, 30));
    controller.drain_events();

    controller.exit_scrollback(
        ExitRequest {
            emit_exit: true,
            request_id: Some(5),
        },
        at(start, 100),
    );
    let events = controller.drain_events();
    assert_eq!(keystrokes(&events), vec![b"q".to_vec()]);
    assert!(entry_requests(&events).is_empty());
    assert_eq!(controller.copy_mode(), CopyMode::Off);
    assert_eq!(controller.gesture_state(), GestureState::Idle);
}

#[test]
fn exit_without_keys_when_remote_already_left() {
    let start = Instant::now();
    let mut controller = ScrollController::with_defaults(ScrollConfig::default(), 24);
    enter_copy_mode(&mut controller, start, 200.0);
    controller.drain_events();

    controller.exit_scrollback(
        ExitRequest {
            emit_exit: false,
            request_id: Some(3),
        },
        at(start, 50),
    );
    let events = controller.drain_events();
    assert!(keystrokes(&events).is_empty());
    assert_eq!(
        events,
        vec![ScrollEvent::ScrollbackModeChanged {
            active: false,
            phase: ScrollbackPhase::Inactive,
            request_id: Some(3),
        }]
    );
    assert_eq!(controller.copy_mode(), CopyMode::Off);
}

#[test]
fn exit_when_idle_only_notifies() {
    let mut controller = ScrollController::with_defaults(ScrollConfig::default(), 24);
    let request = ExitRequest {
        emit_exit: true,
        request_id: None,
    };
    for _ in 0..2 {
        controller.exit_scrollback(request, Instant::now());
        assert_eq!(
            controller.drain_events(),
            vec![ScrollEvent::ScrollbackModeChanged {
                active: false,
                phase: ScrollbackPhase::Inactive,
                request_id: None,
            }]
        );
        assert_eq!(controller.gesture_state(), GestureState::Idle);
        assert_eq!(controller.copy_mode(), CopyMode::Off);
    }
}

#[test]
fn debug_mode_reports_transitions() {
    let start = Instant::now();
    let config = ScrollConfig {
        debug: true,
        ..ScrollConfig::default()
    };
    let mut controller = ScrollController::with_defaults(config, 24);
    controller.on_contact_down(1, Point::new(0.0, 0.0), start);
    controller.on_contact_cancel(1, at(start, 5));
    let events = controller.drain_events();
    assert!(events.iter().any(
        |event| matches!(event, ScrollEvent::Debug(message) if message.contains("cancelled"))
    ));
}
