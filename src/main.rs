fn main() {
    waypost::logging::init();
    if let Err(err) = waypost::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
