use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use tickcast::engine::{serve_connection, Disconnect, SessionId};
use tickcast::protocol::{decode_frame, Click, Frame, Record};
use tickcast::{AssetCatalog, Engine, EngineConfig, SessionTarget};
use tokio::task::JoinHandle;

type Inbound = UnboundedSender<Result<String, String>>;

struct Viewer {
    input: Inbound,
    frames: UnboundedReceiver<String>,
    task: JoinHandle<(SessionId, Disconnect)>,
}

fn connect(engine: &Engine) -> Viewer {
    let (sink, frames) = mpsc::unbounded::<String>();
    let (input, stream) = mpsc::unbounded::<Result<String, String>>();
    let task = tokio::spawn(serve_connection(
        engine.hub().clone(),
        engine.config().outbound_capacity,
        sink,
        stream,
    ));
    Viewer { input, frames, task }
}

fn start(single_session: bool) -> Arc<Engine> {
    let mut assets = AssetCatalog::new();
    assets.register_sound("boom.wav");
    let config = EngineConfig {
        single_session,
        ..Default::default()
    };
    Arc::new(Engine::start(config, assets).unwrap())
}

async fn wait_for_players(engine: &Engine, n: usize) {
    for _ in 0..500 {
        if engine.player_count().await.unwrap() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("expected {n} players");
}

#[tokio::test]
async fn input_is_applied_in_order() {
    let engine = start(false);
    let viewer = connect(&engine);
    wait_for_players(&engine, 1).await;

    for msg in ["keydown a", "not a command", "keyup a", "keydown b", "click 1 5 6"] {
        viewer.input.unbounded_send(Ok(msg.to_string())).unwrap();
    }

    let mut clicks = Vec::new();
    for _ in 0..500 {
        clicks.extend(engine.poll_clicks(SessionTarget::Latest).await.unwrap());
        if !clicks.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // The click came last, so every key event before it has been applied.
    assert_eq!(clicks, vec![Click { button: 1, x: 5, y: 6 }]);
    assert!(!engine.key_down(SessionTarget::Latest, "a").await.unwrap());
    assert!(engine.key_down(SessionTarget::Latest, "b").await.unwrap());
    assert!(engine.poll_clicks(SessionTarget::Latest).await.unwrap().is_empty());
}

#[tokio::test]
async fn every_viewer_gets_the_tick() {
    let engine = start(false);
    let mut a = connect(&engine);
    let mut b = connect(&engine);
    wait_for_players(&engine, 2).await;

    let canvas = engine.canvas();
    canvas.entities.add_point("#ff0000", 1.0, 2.0, 3.0, -4.0);
    canvas.play_sound("boom.wav");
    let counter = engine.send(&canvas);

    for viewer in [&mut a, &mut b] {
        let visual = decode_frame(&viewer.frames.next().await.unwrap()).unwrap();
        assert_eq!(
            visual,
            Frame::Visual {
                counter,
                records: vec![Record::Point {
                    colour: "#ff0000".into(),
                    x: 1.0,
                    y: 2.0,
                    vx: 90.0,
                    vy: -120.0,
                }],
            }
        );
        let audio = decode_frame(&viewer.frames.next().await.unwrap()).unwrap();
        assert_eq!(audio, Frame::Audio(vec!["sound0".into()]));
    }

    drop(a.input);
    let (_, reason) = a.task.await.unwrap();
    assert_eq!(reason, Disconnect::Peer);
    wait_for_players(&engine, 1).await;
}

#[tokio::test]
async fn new_viewer_evicts_old_in_single_session_mode() {
    let engine = start(true);
    let first = connect(&engine);
    wait_for_players(&engine, 1).await;
    first.input.unbounded_send(Ok("keydown x".into())).unwrap();

    let second = connect(&engine);
    let (first_id, reason) = first.task.await.unwrap();
    assert_eq!(reason, Disconnect::Evicted);

    wait_for_players(&engine, 1).await;
    let live = engine.player_set().await.unwrap();
    assert!(!live.contains(&first_id));
    assert!(!engine.key_down(first_id, "x").await.unwrap());

    drop(second.input);
    second.task.await.unwrap();
    wait_for_players(&engine, 0).await;
}

#[tokio::test]
async fn debug_frames_reach_viewers() {
    let engine = start(false);
    let mut viewer = connect(&engine);
    wait_for_players(&engine, 1).await;

    engine.send_debug("fps <30>");
    let frame = decode_frame(&viewer.frames.next().await.unwrap()).unwrap();
    assert_eq!(frame, Frame::Debug("fps &lt;30&gt;".into()));
}
