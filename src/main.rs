use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use url::Url;
use virtual_gamepad::dispatch::FrameMessage;
use virtual_gamepad::dom::{Document, DocumentHandle, KeyboardEvent, NodeId, PostedMessage};
use virtual_gamepad::gamepad::{ControlRole, Direction, LifecycleEvent};
use virtual_gamepad::input::{MousePhase, PointerInput, TouchPhase};
use virtual_gamepad::{GamepadConfig, GamepadSession};

const PAGE_URL: &str = "https://host.example/";
const FRAME_SRC: &str = "https://game.example/snake/index.html";

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = GamepadConfig::load_or_default();
    info!(
        "Using repeat interval of {}ms",
        config.repeat_interval_ms
    );

    let page = build_page()?;
    let mut canvas_events = page
        .document
        .with(|doc| doc.add_key_listener(page.canvas))?;
    let mut frame_inbox = page.document.with(|doc| doc.load_frame(page.frame))?;

    // Canvas game: d-pad plus a jump button
    let mut canvas_session = GamepadSession::new(
        page.document.clone(),
        page.canvas,
        ["ArrowUp", "ArrowDown", "ArrowLeft", "ArrowRight", " "],
        None,
    )?
    .with_config(config.clone())?;
    canvas_session.on(LifecycleEvent::Unbind, || {
        info!("Canvas gamepad closed");
        Ok(())
    });

    // Embedded game: only horizontal movement and two actions
    let mut frame_session =
        GamepadSession::new(page.document.clone(), page.frame, ["left", "right", "z", "x"], None)?
            .with_config(config)?;
    frame_session.on_named("unbind", || {
        info!("Frame gamepad closed");
        Ok(())
    });

    canvas_session.bind();
    frame_session.bind();
    if !canvas_session.is_bound() || !frame_session.is_bound() {
        return Err(eyre!("Unable to bind the demo gamepads"));
    }

    let up = control(&canvas_session, ControlRole::DpadButton(Direction::Up))?;
    let space = control(&canvas_session, ControlRole::SpaceButton)?;
    let right = control(&frame_session, ControlRole::DpadButton(Direction::Right))?;
    let z = control(&frame_session, ControlRole::ActionButton('Z'))?;

    info!("Holding up for 180ms");
    canvas_session.handle_pointer(up, PointerInput::Touch(TouchPhase::Start));
    sleep(Duration::from_millis(180)).await;
    canvas_session.handle_pointer(up, PointerInput::Touch(TouchPhase::End));

    info!("Tapping space with the mouse");
    canvas_session.handle_pointer(space, PointerInput::Mouse(MousePhase::Down));
    sleep(Duration::from_millis(20)).await;
    canvas_session.handle_pointer(space, PointerInput::Mouse(MousePhase::Up));

    info!("Holding right in the frame while tapping Z");
    frame_session.handle_pointer(right, PointerInput::Touch(TouchPhase::Start));
    frame_session.handle_pointer(z, PointerInput::Touch(TouchPhase::Start));
    sleep(Duration::from_millis(30)).await;
    frame_session.handle_pointer(z, PointerInput::Touch(TouchPhase::End));
    sleep(Duration::from_millis(90)).await;
    frame_session.handle_pointer(right, PointerInput::Touch(TouchPhase::Cancel));

    log_canvas_events(&mut canvas_events);
    log_frame_messages(&mut frame_inbox);

    let close = control(&canvas_session, ControlRole::CloseButton)?;
    canvas_session.handle_pointer(close, PointerInput::Click);
    frame_session.unbind();

    let restored_display = page
        .document
        .with(|doc| doc.style_property(page.canvas, "display"));
    info!("Canvas restored with display {:?}", restored_display);

    Ok(())
}

struct Page {
    document: DocumentHandle,
    canvas: NodeId,
    frame: NodeId,
}

fn build_page() -> Result<Page> {
    let location = Url::parse(PAGE_URL)?;
    let document = DocumentHandle::new(Document::with_location(location));

    let (canvas, frame) = document.with(|doc| -> Result<(NodeId, NodeId)> {
        let body = doc.body();
        let main = doc.create_element("main");
        let canvas = doc.create_element("canvas");
        doc.set_id(canvas, "game")?;
        doc.set_style_property(canvas, "display", "block")?;
        let frame = doc.create_frame(FRAME_SRC);

        doc.append_child(body, main)?;
        doc.append_child(main, canvas)?;
        doc.append_child(main, frame)?;
        Ok((canvas, frame))
    })?;

    Ok(Page {
        document,
        canvas,
        frame,
    })
}

fn control(session: &GamepadSession, role: ControlRole) -> Result<NodeId> {
    session
        .overlay_node(role)
        .ok_or_else(|| eyre!("No {:?} rendered for {:?}", role, session.target()))
}

fn log_canvas_events(events: &mut UnboundedReceiver<KeyboardEvent>) {
    while let Ok(event) = events.try_recv() {
        info!(
            "[{}] canvas received {} {:?}",
            event.time_stamp.format("%H:%M:%S.%3f"),
            event.event_type,
            event.key
        );
    }
}

fn log_frame_messages(inbox: &mut UnboundedReceiver<PostedMessage>) {
    while let Ok(message) = inbox.try_recv() {
        match serde_json::from_value::<FrameMessage>(message.data) {
            Ok(FrameMessage::KeyboardEvent(payload)) => info!(
                "frame ({}) received {} {:?}",
                message.target_origin, payload.event_type, payload.key
            ),
            Err(e) => warn!("Frame received an unreadable message: {}", e),
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

/// Filter from `RUST_LOG` directives (e.g. `virtual_gamepad=debug,info`)
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn setup_logging_env() {
    let directives = std::env::var("RUST_LOG").ok();

    FmtSubscriber::builder()
        .with_env_filter(log_filter(directives.as_deref()))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
