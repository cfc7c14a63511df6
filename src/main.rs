fn main() {
    if let Err(err) = ev_status_sync::app::run() {
        eprintln!("monitor startup failed: {err}");
        std::process::exit(1);
    }
}
