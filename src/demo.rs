//! Demo producer: a drifting starfield, a ship steered with the arrow keys,
//! and a blip wherever the viewer clicks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::{debug, info};

use crate::core::{AssetCatalog, Canvas, EntityId, Shape};
use crate::engine::{Engine, SessionTarget};

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 600.0;
const STARS: usize = 120;
const SHIP_SPEED: f64 = 4.0;

const SHIP_SPRITE: &str = "ship.png";
const BLIP_SOUND: &str = "blip.wav";

pub fn assets() -> AssetCatalog {
    let mut assets = AssetCatalog::new();
    assets.register_sprite(SHIP_SPRITE);
    assets.register_sound(BLIP_SOUND);
    assets
}

pub async fn run(engine: Arc<Engine>) -> Result<()> {
    let canvas = engine.canvas();
    let stars = spawn_stars(&canvas);
    let ship = canvas.entities.add_sprite(SHIP_SPRITE, WIDTH / 2.0, HEIGHT / 2.0, 0.0, 0.0);
    let caption = canvas.entities.add_text("", "Arial", 16.0, "#ffffff", WIDTH / 2.0, 20.0, 0.0, 0.0);
    let mut blips: Vec<EntityId> = Vec::new();

    let period = Duration::from_secs_f64(1.0 / engine.config().tick_rate);
    let mut ticker = tokio::time::interval(period);
    info!(stars = stars.len(), ?period, "demo running");

    loop {
        ticker.tick().await;

        for &star in &stars {
            canvas.entities.update(star, |e| {
                e.step();
                if e.x < 0.0 {
                    e.x += WIDTH;
                }
            });
        }

        steer(&engine, &canvas, ship).await?;
        canvas.entities.move_entity(ship);

        for click in engine.poll_clicks(SessionTarget::Latest).await? {
            debug!(?click, "spawning blip");
            let blip = canvas.entities.add_point("#ffcc00", click.x as f64, click.y as f64, 0.0, 1.0);
            blips.push(blip);
            canvas.play_sound(BLIP_SOUND);
        }
        blips.retain(|&blip| {
            canvas.entities.move_entity(blip);
            let gone = canvas.entities.get(blip).map_or(true, |e| e.y > HEIGHT);
            if gone {
                canvas.entities.remove(blip);
            }
            !gone
        });

        let players = engine.player_count().await?;
        canvas.entities.update(caption, |e| {
            if let Shape::Text { text, .. } = &mut e.shape {
                *text = format!("viewers: {players}  blips: {}", blips.len());
            }
        });

        engine.send(&canvas);
    }
}

fn spawn_stars(canvas: &Canvas) -> Vec<EntityId> {
    let mut rng = rand::rng();
    (0..STARS)
        .map(|_| {
            let x = rng.random_range(0.0..WIDTH);
            let y = rng.random_range(0.0..HEIGHT);
            let speed = rng.random_range(0.5..3.0);
            canvas.entities.add_point("#8888ff", x, y, -speed, 0.0)
        })
        .collect()
}

async fn steer(engine: &Engine, canvas: &Canvas, ship: EntityId) -> Result<()> {
    let mut vx = 0.0;
    let mut vy = 0.0;
    if engine.key_down(SessionTarget::Latest, "ArrowLeft").await? {
        vx -= SHIP_SPEED;
    }
    if engine.key_down(SessionTarget::Latest, "ArrowRight").await? {
        vx += SHIP_SPEED;
    }
    if engine.key_down(SessionTarget::Latest, "ArrowUp").await? {
        vy -= SHIP_SPEED;
    }
    if engine.key_down(SessionTarget::Latest, "ArrowDown").await? {
        vy += SHIP_SPEED;
    }
    canvas.entities.set_velocity(ship, vx, vy);
    Ok(())
}
