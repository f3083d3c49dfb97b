fn main() {
    if let Err(err) = wsvisor::cli::run() {
        eprintln!("supervisor: {:#}", err);
        std::process::exit(wsvisor::cli::exit_code(&err));
    }
}
