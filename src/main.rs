fn main() {
    if let Err(e) = story_companion_lib::run() {
        eprintln!("story-companion: {}", e);
        std::process::exit(1);
    }
}
