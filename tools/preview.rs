/// Preview — plays a dialogue in the terminal, one screen dump per pause.
///
/// Usage: preview --config <path> [--start <sentence>]
///
/// Commands:
///   (empty) / c   — confirm: advance, or take the highlighted choice
///   u / d         — move the choice highlight up / down
///   s             — skip running animations
///   show          — print the screen
///   where         — print the current sentence and call stack
///   help          — list commands
///   quit          — exit

use mika_engine::core::config::EngineConfig;
use mika_engine::core::dialogue::RegionalDialogueManager;
use mika_engine::core::loader::{load_world, start_sentence};
use mika_engine::core::screen::GameScreen;
use mika_engine::core::session::{DialogueSession, GameKey};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut config_path = None;
    let mut start = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--start" if i + 1 < args.len() => {
                i += 1;
                start = Some(args[i].clone());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(config_path) = config_path else {
        print_usage();
        std::process::exit(1);
    };
    let config_path = Path::new(&config_path);
    let config = match EngineConfig::load_from_ron(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: Failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    let base_dir = config_path.parent().unwrap_or(Path::new("."));
    let world = match load_world(&config, base_dir) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("ERROR: Failed to load dialogue: {}", e);
            std::process::exit(1);
        }
    };
    let start = match start.map(Ok).unwrap_or_else(|| start_sentence(&config, &world)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "Loaded {} sentences, {} regions, {} macros",
        world.sentences().len(),
        world.regions().len(),
        world.macros().len()
    );
    println!("Starting at '{}'. Type 'help' for commands.\n", start);

    let screen = Arc::new(GameScreen::new(config.screen_size));
    let session = DialogueSession::new(RegionalDialogueManager::new(world, start), screen.clone());

    let mut running: Option<JoinHandle<()>> = Some({
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.start().await })
    });
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            finished = wait_for(&mut running) => {
                running = None;
                if let Err(e) = finished {
                    eprintln!("ERROR: playback task failed: {}", e);
                }
                print_screen(&screen, &session);
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    _ => break,
                };
                let cmd = line.trim().to_lowercase();
                let key = match cmd.as_str() {
                    "quit" | "exit" | "q" => {
                        println!("Goodbye.");
                        session.interrupt_all();
                        break;
                    }
                    "help" | "h" | "?" => {
                        print_help();
                        continue;
                    }
                    "show" => {
                        print_screen(&screen, &session);
                        continue;
                    }
                    "where" => {
                        let (current, stack) = session.with_manager(|m| {
                            (m.current_name().map(str::to_string), m.call_stack().to_vec())
                        });
                        println!("current: {}", current.as_deref().unwrap_or("<none>"));
                        println!("call stack: {:?}", stack);
                        continue;
                    }
                    "s" | "skip" => {
                        println!("Skipped {} animation(s)", session.skip());
                        continue;
                    }
                    "" | "c" | "confirm" => GameKey::Confirm,
                    "u" | "up" => GameKey::Up,
                    "d" | "down" => GameKey::Down,
                    other => {
                        println!("Unknown command: {}", other);
                        continue;
                    }
                };
                if let Some(flow) = session.handle_key(key) {
                    running = Some(flow);
                }
            }
        }
    }
}

async fn wait_for(flow: &mut Option<JoinHandle<()>>) -> Result<(), tokio::task::JoinError> {
    match flow {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn print_screen(screen: &GameScreen, session: &DialogueSession) {
    let width = screen.dim().x.max(0) as usize;
    println!("+{}+", "-".repeat(width));
    for y in 0..screen.dim().y {
        println!("|{}|", screen.row_text(y));
    }
    println!("+{}+", "-".repeat(width));
    let current = session.current_name().unwrap_or_default();
    match session.current_choice() {
        Some(choice) => println!("[{}] choice {}", current, choice),
        None => println!("[{}]", current),
    }
}

fn print_usage() {
    println!("Usage: preview --config <path> [--start <sentence>]");
    println!();
    println!("Plays the dialogue described by an engine config in the terminal.");
    println!("Set RUST_LOG=debug to trace sentence transitions.");
}

fn print_help() {
    println!("Commands:");
    println!("  (empty) / c   confirm: advance, or take the highlighted choice");
    println!("  u / d         move the choice highlight up / down");
    println!("  s             skip running animations");
    println!("  show          print the screen");
    println!("  where         print the current sentence and call stack");
    println!("  help          list commands");
    println!("  quit          exit");
}
