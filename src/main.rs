fn main() {
    #[cfg(unix)]
    unsafe {
        // Avoid panics when piping output (e.g. `kilonova --dry-run ... | head`).
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    if let Err(err) = kilonova::run() {
        eprintln!("error: {err:#}");
        std::process::exit(kilonova::exit_code(&err));
    }
}
