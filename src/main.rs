fn main() {
    if let Err(err) = sentiflow_lib::run() {
        eprintln!("sentiflow failed: {err:#}");
        std::process::exit(1);
    }
}
