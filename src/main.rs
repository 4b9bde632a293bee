fn main() {
    if let Err(err) = deskreplay_lib::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
