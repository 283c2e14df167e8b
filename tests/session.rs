use std::sync::{Arc, Mutex};
use std::time::Duration;

use color_eyre::eyre::eyre;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time;
use url::Url;
use virtual_gamepad::dispatch::FrameMessage;
use virtual_gamepad::dom::{Document, DocumentHandle, KeyEventType, KeyboardEvent, NodeId};
use virtual_gamepad::gamepad::{ControlRole, Direction, LifecycleEvent, LogicalKey};
use virtual_gamepad::input::{MousePhase, PointerEngagement, PointerInput, TouchPhase};
use virtual_gamepad::{GamepadConfig, GamepadError, GamepadSession};

const LOCK_CLASS: &str = "mobile-gamepad-noscroll";
const LOCK_STYLE_ID: &str = "mobile-gamepad-scroll-lock-style";

/// Page with `<header/><canvas style="display: block"/><footer/>` in the body
fn page() -> (DocumentHandle, NodeId, NodeId) {
    let handle = DocumentHandle::new(Document::with_location(
        Url::parse("https://host.example/play/").unwrap(),
    ));
    let (canvas, footer) = handle.with(|doc| {
        let body = doc.body();
        let header = doc.create_element("header");
        let canvas = doc.create_element("canvas");
        let footer = doc.create_element("footer");
        for node in [header, canvas, footer] {
            doc.append_child(body, node).unwrap();
        }
        doc.set_style_property(canvas, "display", "block").unwrap();
        (canvas, footer)
    });
    (handle, canvas, footer)
}

fn listen(handle: &DocumentHandle, node: NodeId) -> UnboundedReceiver<KeyboardEvent> {
    handle.with(|doc| doc.add_key_listener(node).unwrap())
}

fn drain(rx: &mut UnboundedReceiver<KeyboardEvent>) -> Vec<(KeyEventType, String)> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push((event.event_type, event.key));
    }
    events
}

fn count(events: &[(KeyEventType, String)], event_type: KeyEventType) -> usize {
    events.iter().filter(|(t, _)| *t == event_type).count()
}

#[tokio::test(start_paused = true)]
async fn test_bind_and_unbind_are_idempotent() {
    let (handle, canvas, _) = page();
    let mut session = GamepadSession::new(handle.clone(), canvas, ["a"], None).unwrap();

    session.bind();
    let overlay = session.overlay_node(ControlRole::Overlay).unwrap();
    session.bind();
    assert_eq!(session.overlay_node(ControlRole::Overlay), Some(overlay));
    let body_children = handle.with(|doc| doc.children(doc.body()));
    assert_eq!(
        body_children.iter().filter(|node| **node == overlay).count(),
        1
    );
    assert_eq!(handle.with(|doc| doc.lease_count("scroll-lock:mobile-gamepad-noscroll")), 1);

    session.unbind();
    session.unbind();
    assert!(!session.is_bound());
    assert!(session.overlay_node(ControlRole::Overlay).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unbind_restores_original_placement() {
    let (handle, canvas, footer) = page();
    let (parent, style_before) = handle.with(|doc| (doc.parent(canvas), doc.style(canvas)));

    let mut session = GamepadSession::new(handle.clone(), canvas, ["ArrowUp", " "], None).unwrap();
    session.bind();

    let wrapper = session.overlay_node(ControlRole::TargetWrapper).unwrap();
    assert_eq!(handle.with(|doc| doc.parent(canvas)), Some(wrapper));
    let placement = session.placement().cloned().unwrap();
    assert_eq!(placement.parent, parent);
    assert_eq!(placement.next_sibling, Some(footer));
    assert_eq!(placement.display.as_deref(), Some("block"));

    // the page may restyle the target while it sits in the overlay
    handle.with(|doc| doc.set_style_property(canvas, "display", "none").unwrap());

    session.unbind();
    handle.with(|doc| {
        assert_eq!(doc.parent(canvas), parent);
        assert_eq!(doc.next_sibling(canvas), Some(footer));
        assert_eq!(doc.style(canvas), style_before);
        assert!(!doc.is_connected(wrapper));
    });
    assert!(session.placement().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unset_display_is_removed_again() {
    let (handle, canvas, _) = page();
    handle.with(|doc| doc.remove_style_property(canvas, "display").unwrap());

    let mut session = GamepadSession::new(handle.clone(), canvas, ["a"], None).unwrap();
    session.bind();
    handle.with(|doc| doc.set_style_property(canvas, "display", "flex").unwrap());
    session.unbind();

    assert_eq!(handle.with(|doc| doc.style_property(canvas, "display")), None);
}

#[tokio::test(start_paused = true)]
async fn test_held_control_repeats_then_releases_once() {
    let (handle, canvas, _) = page();
    let mut events = listen(&handle, canvas);
    let mut session = GamepadSession::new(handle.clone(), canvas, ["ArrowUp"], None).unwrap();
    session.bind();

    let up = session
        .overlay_node(ControlRole::DpadButton(Direction::Up))
        .unwrap();
    assert!(session.handle_pointer(up, PointerInput::Touch(TouchPhase::Start)));
    assert!(session.is_pressed(&LogicalKey::new("ArrowUp")));

    time::sleep(Duration::from_millis(120)).await;
    assert!(session.handle_pointer(up, PointerInput::Touch(TouchPhase::End)));

    let seen = drain(&mut events);
    assert_eq!(count(&seen, KeyEventType::KeyDown), 3);
    assert_eq!(count(&seen, KeyEventType::KeyUp), 1);
    assert!(seen.iter().all(|(_, key)| key == "ArrowUp"));
    assert_eq!(seen.last().unwrap().0, KeyEventType::KeyUp);

    time::sleep(Duration::from_millis(500)).await;
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_press_count_tracks_hold_duration() {
    let (handle, canvas, _) = page();
    let mut events = listen(&handle, canvas);
    let mut session = GamepadSession::new(handle.clone(), canvas, ["a"], None).unwrap();
    session.bind();
    let key = LogicalKey::new("a");

    for held_ms in [10_u64, 75, 260, 1_010] {
        assert!(session.engage(&key, PointerEngagement::Begin));
        time::sleep(Duration::from_millis(held_ms)).await;
        session.engage(&key, PointerEngagement::End);

        let seen = drain(&mut events);
        let expected = (held_ms / 50 + 1) as usize;
        let presses = count(&seen, KeyEventType::KeyDown);
        assert!(
            presses.abs_diff(expected) <= 1,
            "held {}ms: {} presses, expected about {}",
            held_ms,
            presses,
            expected
        );
        assert_eq!(count(&seen, KeyEventType::KeyUp), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_pointer_leaving_control_releases() {
    let (handle, canvas, _) = page();
    let mut events = listen(&handle, canvas);
    let mut session = GamepadSession::new(handle.clone(), canvas, [" "], None).unwrap();
    session.bind();

    let space = session.overlay_node(ControlRole::SpaceButton).unwrap();
    session.handle_pointer(space, PointerInput::Mouse(MousePhase::Down));
    session.handle_pointer(space, PointerInput::Mouse(MousePhase::Leave));
    session.handle_pointer(space, PointerInput::Mouse(MousePhase::Up));

    assert_eq!(
        drain(&mut events),
        vec![
            (KeyEventType::KeyDown, " ".to_string()),
            (KeyEventType::KeyUp, " ".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_release_without_activation_is_silent() {
    let (handle, canvas, _) = page();
    let mut events = listen(&handle, canvas);
    let mut session = GamepadSession::new(handle.clone(), canvas, ["z"], None).unwrap();
    session.bind();

    let z = session
        .overlay_node(ControlRole::ActionButton('Z'))
        .unwrap();
    session.handle_pointer(z, PointerInput::Touch(TouchPhase::End));
    session.handle_pointer(z, PointerInput::Touch(TouchPhase::Cancel));
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dpad_renders_placeholders_for_unbound_directions() {
    let (handle, canvas, _) = page();
    let mut session =
        GamepadSession::new(handle.clone(), canvas, ["ArrowUp", "ArrowLeft"], None).unwrap();
    session.bind();

    let dpad = session.overlay_node(ControlRole::DpadContainer).unwrap();
    let up = session
        .overlay_node(ControlRole::DpadButton(Direction::Up))
        .unwrap();
    let left = session
        .overlay_node(ControlRole::DpadButton(Direction::Left))
        .unwrap();
    let down = session
        .overlay_node(ControlRole::DpadPlaceholder(Direction::Down))
        .unwrap();
    let right = session
        .overlay_node(ControlRole::DpadPlaceholder(Direction::Right))
        .unwrap();

    assert!(session.is_interactive(up) && session.is_interactive(left));
    assert!(!session.is_interactive(down) && !session.is_interactive(right));
    assert!(session
        .overlay_node(ControlRole::DpadButton(Direction::Down))
        .is_none());

    handle.with(|doc| {
        assert_eq!(doc.children(dpad), vec![up, down, left, right]);
        assert_eq!(doc.content(up), Some("▲"));
        assert_eq!(doc.tag(down), Some("div"));
        assert_eq!(
            doc.style_property(right, "pointer-events").as_deref(),
            Some("none")
        );
    });

    let mut events = listen(&handle, canvas);
    session.handle_pointer(down, PointerInput::Touch(TouchPhase::Start));
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_action_letters_are_sorted() {
    let (handle, canvas, _) = page();
    let mut session = GamepadSession::new(handle.clone(), canvas, ["Z", "A", "M"], None).unwrap();
    session.bind();

    let actions = session.overlay_node(ControlRole::ActionContainer).unwrap();
    let labels: Vec<String> = handle.with(|doc| {
        doc.children(actions)
            .into_iter()
            .map(|node| doc.content(node).unwrap_or_default().to_string())
            .collect()
    });
    assert_eq!(labels, vec!["A", "M", "Z"]);
    assert!(session.overlay_node(ControlRole::DpadContainer).is_none());
    assert!(session.overlay_node(ControlRole::SpaceButton).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unrecognized_keys_get_no_control() {
    let (handle, canvas, _) = page();
    let mut session = GamepadSession::new(handle.clone(), canvas, ["Enter", "F1"], None).unwrap();
    session.bind();

    assert!(session.is_bound());
    assert!(session.bound_keys().contains(&LogicalKey::new("enter")));
    assert!(session.overlay_node(ControlRole::ActionContainer).is_none());
    assert!(!session.engage(&LogicalKey::new("enter"), PointerEngagement::Begin));
}

#[tokio::test(start_paused = true)]
async fn test_frame_target_receives_messages_only() {
    let (handle, _, _) = page();
    let (frame, mut inbox) = handle.with(|doc| {
        let frame = doc.create_frame("https://game.example/snake/index.html");
        let body = doc.body();
        doc.append_child(body, frame).unwrap();
        let inbox = doc.load_frame(frame).unwrap();
        (frame, inbox)
    });
    let mut on_frame = listen(&handle, frame);
    let mut on_body = handle.with(|doc| doc.add_key_listener(doc.body()).unwrap());

    let mut session = GamepadSession::new(handle.clone(), frame, ["ArrowRight"], None).unwrap();
    session.bind();
    let right = session
        .overlay_node(ControlRole::DpadButton(Direction::Right))
        .unwrap();

    session.handle_pointer(right, PointerInput::Touch(TouchPhase::Start));
    session.handle_pointer(right, PointerInput::Touch(TouchPhase::End));

    let mut messages = Vec::new();
    while let Ok(message) = inbox.try_recv() {
        assert_eq!(message.target_origin, "https://game.example");
        messages.push(serde_json::from_value::<FrameMessage>(message.data).unwrap());
    }
    assert_eq!(
        messages,
        vec![
            FrameMessage::keyboard(KeyEventType::KeyDown, "ArrowRight"),
            FrameMessage::keyboard(KeyEventType::KeyUp, "ArrowRight"),
        ]
    );
    assert!(drain(&mut on_frame).is_empty());
    assert!(drain(&mut on_body).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_listener_override_receives_dispatches() {
    let (handle, canvas, _) = page();
    let root = handle.with(|doc| doc.document_element());
    let mut on_root = listen(&handle, root);
    let mut on_canvas = listen(&handle, canvas);

    let mut session = GamepadSession::new(handle.clone(), canvas, ["b"], Some(root)).unwrap();
    session.bind();
    let key = LogicalKey::new("b");
    session.engage(&key, PointerEngagement::Begin);
    session.engage(&key, PointerEngagement::End);

    assert_eq!(drain(&mut on_root).len(), 2);
    assert!(drain(&mut on_canvas).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unbind_notifies_once_after_teardown() {
    let (handle, canvas, _) = page();
    let mut session = GamepadSession::new(handle.clone(), canvas, ["a"], None).unwrap();

    let observed = Arc::new(Mutex::new(Vec::new()));
    let log = observed.clone();
    let doc = handle.clone();
    session
        .on(LifecycleEvent::Unbind, move || {
            let parent = doc.with(|d| d.parent(canvas));
            log.lock().unwrap().push(parent);
            Ok(())
        })
        .on(LifecycleEvent::Unbind, || Err(eyre!("observer failure")));

    session.bind();
    session.unbind();

    let body = handle.with(|doc| doc.body());
    assert_eq!(*observed.lock().unwrap(), vec![Some(body)]);

    // registrations were cleared by the first unbind
    session.bind();
    session.unbind();
    assert_eq!(observed.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unbind_cancels_held_keys_without_keyup() {
    let (handle, canvas, _) = page();
    let mut events = listen(&handle, canvas);
    let mut session = GamepadSession::new(handle.clone(), canvas, ["a", "ArrowDown"], None).unwrap();
    session.bind();

    session.engage(&LogicalKey::new("a"), PointerEngagement::Begin);
    session.engage(&LogicalKey::new("down"), PointerEngagement::Begin);
    time::sleep(Duration::from_millis(60)).await;
    session.unbind();
    let before = drain(&mut events);
    assert_eq!(count(&before, KeyEventType::KeyDown), 4);
    assert_eq!(count(&before, KeyEventType::KeyUp), 0);

    time::sleep(Duration::from_millis(500)).await;
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pressed_feedback_on_control() {
    let (handle, canvas, _) = page();
    let config = GamepadConfig::default();
    let mut session = GamepadSession::new(handle.clone(), canvas, ["q"], None)
        .unwrap()
        .with_config(config.clone())
        .unwrap();
    session.bind();

    let q = session
        .overlay_node(ControlRole::ActionButton('Q'))
        .unwrap();
    let background = |handle: &DocumentHandle| {
        handle.with(|doc| doc.style_property(q, "background-color"))
    };

    session.handle_pointer(q, PointerInput::Touch(TouchPhase::Start));
    assert_eq!(background(&handle), Some(config.theme.pressed_color.clone()));
    session.handle_pointer(q, PointerInput::Touch(TouchPhase::End));
    assert_eq!(background(&handle), Some(config.theme.idle_color.clone()));
}

#[tokio::test(start_paused = true)]
async fn test_scroll_lock_is_shared_between_sessions() {
    let (handle, canvas, _) = page();
    let second = handle.with(|doc| {
        let node = doc.create_element("canvas");
        let body = doc.body();
        doc.append_child(body, node).unwrap();
        node
    });
    let locked = |handle: &DocumentHandle| {
        handle.with(|doc| {
            doc.has_class(doc.document_element(), LOCK_CLASS) && doc.has_class(doc.body(), LOCK_CLASS)
        })
    };

    let mut first_session = GamepadSession::new(handle.clone(), canvas, ["a"], None).unwrap();
    let mut second_session = GamepadSession::new(handle.clone(), second, ["b"], None).unwrap();
    first_session.bind();
    second_session.bind();
    assert!(locked(&handle));

    let style_rules = handle.with(|doc| {
        doc.children(doc.head())
            .into_iter()
            .filter(|node| doc.tag(*node) == Some("style"))
            .count()
    });
    assert_eq!(style_rules, 1);
    assert!(handle.with(|doc| doc.element_by_id(LOCK_STYLE_ID)).is_some());

    first_session.unbind();
    assert!(locked(&handle));
    second_session.unbind();
    assert!(!locked(&handle));
}

#[tokio::test(start_paused = true)]
async fn test_target_cannot_be_bound_twice() {
    let (handle, canvas, _) = page();
    let mut first = GamepadSession::new(handle.clone(), canvas, ["a"], None).unwrap();
    let mut second = GamepadSession::new(handle.clone(), canvas, ["b"], None).unwrap();

    first.bind();
    assert!(matches!(
        second.try_bind(),
        Err(GamepadError::TargetInUse(node)) if node == canvas
    ));
    assert!(!second.is_bound());
    assert_eq!(
        handle.with(|doc| doc.parent(canvas)),
        first.overlay_node(ControlRole::TargetWrapper)
    );

    first.unbind();
    second.bind();
    assert!(second.is_bound());
}

#[tokio::test(start_paused = true)]
async fn test_close_button_click_unbinds() {
    let (handle, canvas, _) = page();
    let mut session = GamepadSession::new(handle.clone(), canvas, ["a"], None).unwrap();
    let fired = Arc::new(Mutex::new(0));
    let counter = fired.clone();
    session.on_named("unbind", move || {
        *counter.lock().unwrap() += 1;
        Ok(())
    });
    session.bind();

    let close = session.overlay_node(ControlRole::CloseButton).unwrap();
    assert_eq!(handle.with(|doc| doc.content(close).map(str::to_string)), Some("X".to_string()));
    session.handle_pointer(close, PointerInput::Touch(TouchPhase::Start));
    assert!(session.is_bound());

    session.handle_pointer(close, PointerInput::Click);
    assert!(!session.is_bound());
    assert_eq!(*fired.lock().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_original_parent_falls_back_to_body() {
    let (handle, _, _) = page();
    let (container, canvas) = handle.with(|doc| {
        let container = doc.create_element("section");
        let canvas = doc.create_element("canvas");
        let body = doc.body();
        doc.append_child(body, container).unwrap();
        doc.append_child(container, canvas).unwrap();
        (container, canvas)
    });

    let mut session = GamepadSession::new(handle.clone(), canvas, ["a"], None).unwrap();
    session.bind();
    handle.with(|doc| doc.discard(container).unwrap());
    session.unbind();

    handle.with(|doc| {
        assert_eq!(doc.parent(canvas), Some(doc.body()));
        assert!(doc.is_connected(canvas));
    });
}

#[tokio::test(start_paused = true)]
async fn test_failed_bind_rolls_back() {
    let handle = DocumentHandle::default();
    let body = handle.with(|doc| doc.body());
    let children_before = handle.with(|doc| doc.children(body));

    // the body cannot be moved into an overlay that lives inside it
    let mut session = GamepadSession::new(handle.clone(), body, ["a"], None).unwrap();
    assert!(matches!(session.try_bind(), Err(GamepadError::Dom(_))));
    assert!(!session.is_bound());

    handle.with(|doc| {
        assert_eq!(doc.children(body), children_before);
        assert_eq!(doc.parent(body), Some(doc.document_element()));
        assert!(!doc.has_class(body, LOCK_CLASS));
        assert!(!doc.is_claimed(body));
    });
}

#[tokio::test(start_paused = true)]
async fn test_repeated_cycles_do_not_grow_the_document() {
    let (handle, canvas, _) = page();
    let mut session =
        GamepadSession::new(handle.clone(), canvas, ["ArrowUp", "ArrowLeft", " ", "a", "b"], None)
            .unwrap();

    // the first bind injects the shared scroll lock rule, which stays
    session.bind();
    session.unbind();
    let settled = handle.with(|doc| doc.node_count());

    let mut previous_overlay = None;
    for _ in 0..200 {
        session.bind();
        let overlay = session.overlay_node(ControlRole::Overlay).unwrap();
        assert!(handle.with(|doc| doc.node_count()) > settled);
        session.unbind();

        assert!(!handle.with(|doc| doc.is_alive(overlay)));
        if let Some(previous) = previous_overlay {
            assert!(!handle.with(|doc| doc.is_alive(previous)));
        }
        previous_overlay = Some(overlay);
    }

    assert_eq!(handle.with(|doc| doc.node_count()), settled);
    assert!(handle.with(|doc| doc.element_by_id(LOCK_STYLE_ID)).is_some());
    assert!(handle.with(|doc| doc.is_connected(canvas)));
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribed_callback_is_not_notified() {
    let (handle, canvas, _) = page();
    let mut session = GamepadSession::new(handle, canvas, ["a"], None).unwrap();
    let fired = Arc::new(Mutex::new(Vec::new()));

    let log = fired.clone();
    let dropped = session.subscribe(LifecycleEvent::Unbind, move || {
        log.lock().unwrap().push("dropped");
        Ok(())
    });
    let log = fired.clone();
    session.subscribe(LifecycleEvent::Unbind, move || {
        log.lock().unwrap().push("kept");
        Ok(())
    });

    assert!(session.off(dropped));
    session.bind();
    session.unbind();
    assert_eq!(*fired.lock().unwrap(), vec!["kept"]);
}
