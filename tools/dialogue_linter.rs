/// Dialogue Linter — static checks over dialogue modules.
///
/// Usage: dialogue_linter <config.ron | modules_dir> [--package <name>]

use mika_engine::core::config::EngineConfig;
use mika_engine::core::dialogue::DialogueWorld;
use mika_engine::core::loader::{load_modules_dir, load_world, CHOICE_MACROS};
use mika_engine::core::modules::resolve;
use mika_engine::schema::sentence::ConvField;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: dialogue_linter <config.ron | modules_dir> [--package <name>]");
        process::exit(0);
    }

    let target = Path::new(&args[1]);
    let mut package = String::new();
    let mut i = 2;
    while i < args.len() {
        if args[i] == "--package" && i + 1 < args.len() {
            i += 1;
            package = args[i].clone();
        }
        i += 1;
    }

    let world = if target.is_file() {
        let config = match EngineConfig::load_from_ron(target) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("ERROR: Failed to load config: {}", e);
                process::exit(1);
            }
        };
        load_world(&config, target.parent().unwrap_or(Path::new(".")))
    } else if target.is_dir() {
        load_modules_dir(target, &package).and_then(|sentences| {
            Ok(DialogueWorld::builder()
                .regions(EngineConfig::default().regions)
                .predefined_macros(CHOICE_MACROS)
                .sentences(sentences)
                .build()?)
        })
    } else {
        eprintln!("ERROR: Path '{}' does not exist", target.display());
        process::exit(1);
    };
    let world = match world {
        Ok(w) => w,
        Err(e) => {
            eprintln!("ERROR: Failed to load dialogue: {}", e);
            process::exit(1);
        }
    };

    println!("Loaded {} sentences", world.sentences().len());

    let (errors, warnings) = lint_world(&world);

    println!("\n=== Dialogue Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!("\nSummary: {} errors, {} warnings", errors.len(), warnings.len());

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn lint_world(world: &DialogueWorld) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut names: Vec<&String> = world.sentences().keys().collect();
    names.sort();

    for name in names {
        let sentence = &world.sentences()[name];

        // Static next targets must exist
        if let Some(target) = sentence.conv(ConvField::Next).and_then(|c| c.strip_prefix('=')) {
            match resolve(name, target) {
                Ok(resolved) if !world.has_sentence(&resolved) => errors.push(format!(
                    "Sentence '{}' continues to '{}', which does not exist",
                    name, resolved
                )),
                Ok(_) => {}
                Err(e) => errors.push(format!("Sentence '{}' has a bad next target: {}", name, e)),
            }
        }

        // Static regions must be configured
        if let Some(region) = sentence.conv(ConvField::Region).and_then(|c| c.strip_prefix('=')) {
            if !world.regions().contains_key(region) {
                errors.push(format!("Sentence '{}' renders into unknown region '{}'", name, region));
            }
        }

        if sentence.conv(ConvField::Region).is_none() && sentence.conv(ConvField::Next).is_none() {
            warnings.push(format!("Sentence '{}' is silent and has no next sentence", name));
        }

        // Content must expand against the predefined macros; macros defined
        // by other sentences at runtime make this a warning only
        let scope = world.macros().scope(name);
        if let Err(e) = world.expander().expand(&sentence.content, scope) {
            warnings.push(format!("Sentence '{}' does not expand on its own: {}", name, e));
        }
    }

    (errors, warnings)
}
