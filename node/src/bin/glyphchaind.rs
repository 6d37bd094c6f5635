//! Daemon entry point: initializes logging and runs with the default
//! configuration. No CLI/config-file parsing (out of scope, spec §1); a
//! deployment wanting non-default settings constructs its own `Config` and
//! calls `glyphchain_node::run` directly.
fn main() {
    env_logger::init();

    if let Err(err) = glyphchain_node::run(glyphchain_node::Config::default()) {
        log::error!("{err}");
        std::process::exit(1);
    }
}
