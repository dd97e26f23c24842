/// Haunted hallway — plays the bundled dialogue with a scripted sequence of
/// key presses and prints the screen after each one.
///
/// Run with: cargo run --example haunted_hallway

use mika_engine::core::config::EngineConfig;
use mika_engine::core::dialogue::RegionalDialogueManager;
use mika_engine::core::loader::{load_world, start_sentence};
use mika_engine::core::screen::GameScreen;
use mika_engine::core::session::{DialogueSession, GameKey};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = Path::new("resources/config.ron");
    let mut config = EngineConfig::load_from_ron(config_path).expect("Failed to load resources/config.ron");
    // reveal faster than a player would read
    config.initial_tick = 0.01;

    let world = load_world(&config, Path::new("resources")).expect("Failed to load the hallway dialogue");
    let start = start_sentence(&config, &world).expect("No start sentence");
    let screen = Arc::new(GameScreen::new(config.screen_size));
    let session = DialogueSession::new(RegionalDialogueManager::new(world, start), screen.clone());

    println!("=== Haunted Hallway ===\n");
    session.start().await;
    show(&screen, &session, "start");

    let script = [
        GameKey::Confirm,
        GameKey::Confirm,
        GameKey::Down,
        GameKey::Down,
        GameKey::Confirm,
        GameKey::Confirm,
        GameKey::Down,
        GameKey::Confirm,
        GameKey::Confirm,
    ];
    for key in script {
        if let Some(flow) = session.handle_key(key) {
            if let Err(e) = flow.await {
                eprintln!("Playback failed: {}", e);
            }
        }
        // let detached whispers finish
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        show(&screen, &session, &format!("{:?}", key));
    }
}

fn show(screen: &GameScreen, session: &DialogueSession, label: &str) {
    println!(
        "--- after {} ({}) ---",
        label,
        session.current_name().unwrap_or_default()
    );
    println!("{}\n", screen.dump());
}
