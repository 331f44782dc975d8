fn main() {
    if let Err(err) = chatdesk::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
