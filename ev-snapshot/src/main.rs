fn main() {
    if let Err(err) = ev_status_sync::app::run_snapshot_once() {
        eprintln!("snapshot capture failed: {err}");
        std::process::exit(1);
    }
}
