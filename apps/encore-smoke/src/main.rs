//! End-to-end smoke run against the in-memory store: seed two profiles,
//! swipe both ways, list matches, chat, and replay the subscription.

use std::env;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use encore_core::{Profile, Role};
use encore_engine::{ChatStreamEvent, Engine, SwipeOutcome};
use encore_store::MemoryStore;

const DEFAULT_FILTER: &str = "info,encore_engine=debug";

/// Initialize global tracing subscriber with severity gating from environment.
///
/// Precedence: `RUST_LOG`, then `ENCORE_LOG`, then the internal default.
fn init_tracing() {
    let env_filter = filter_from_env();
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(env_filter)
        .try_init();
}

fn filter_from_env() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    if let Some(value) = env::var("ENCORE_LOG").ok().filter(|v| !v.trim().is_empty())
        && let Ok(filter) = EnvFilter::try_new(value)
    {
        return filter;
    }

    EnvFilter::new(DEFAULT_FILTER)
}

fn performer() -> Profile {
    Profile {
        id: "artist-ruby".to_owned(),
        role: Role::Performer,
        name: "Ruby & The Reverbs".to_owned(),
        bio: Some("Four-piece surf rock".to_owned()),
        genre: Some("surf rock".to_owned()),
        venue_type: None,
        profile_image: None,
        header_images: Vec::new(),
        audio_url: Some("https://cdn.example.org/ruby-demo.mp3".to_owned()),
    }
}

fn venue() -> Profile {
    Profile {
        id: "venue-velvet".to_owned(),
        role: Role::Venue,
        name: "The Velvet Room".to_owned(),
        bio: Some("200-cap club downtown".to_owned()),
        genre: None,
        venue_type: Some("club".to_owned()),
        profile_image: None,
        header_images: Vec::new(),
        audio_url: None,
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "smoke run failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::new();
    store.seed_profile(&performer())?;
    store.seed_profile(&venue())?;
    let engine = Engine::new(Arc::new(store));

    let deck = engine.swipe_deck("artist-ruby", Role::Performer).await?;
    info!(cards = deck.len(), "deck built for artist-ruby");

    let first = engine.swipe_right("artist-ruby", "venue-velvet").await?;
    info!(outcome = ?first, "artist swiped right");

    let favorites = engine.favorite_list("artist-ruby").await?;
    info!(
        favorites = ?favorites.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        "favorites for artist-ruby"
    );

    let second = engine.swipe_right("venue-velvet", "artist-ruby").await?;
    let SwipeOutcome::Matched(record) = second else {
        return Err("venue swipe should have completed the match".into());
    };
    info!(match_id = %record.id, "venue swiped right; match formed");

    let list = engine.match_list("artist-ruby").await?;
    info!(
        counterparts = ?list.iter().map(|entry| entry.counterpart.name.as_str()).collect::<Vec<_>>(),
        "match list for artist-ruby"
    );

    engine
        .send_text(&record.id, "artist-ruby", "hey! love the room")
        .await?;
    engine
        .send_date_request(&record.id, "venue-velvet", "2026-09-12")
        .await?;

    let mut subscription = engine.subscribe_chat(&record.id, "artist-ruby").await?;
    engine
        .send_text(&record.id, "venue-velvet", "see you then")
        .await?;

    for _ in 0..3 {
        match subscription.recv().await {
            Some(ChatStreamEvent::Message(message)) => {
                info!(
                    kind = ?message.kind,
                    sender = %message.sender_id,
                    body = %message.body,
                    "chat message"
                );
            }
            Some(ChatStreamEvent::Degraded { retry_in_ms }) => {
                info!(retry_in_ms, "stream degraded");
            }
            None => break,
        }
    }
    subscription.close().await;

    info!("smoke run complete");
    Ok(())
}
