use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Output goes to stderr because stdout may carry
/// native-messaging frames.
pub fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    // Base level from settings, still overridable via RUST_LOG.
    let default = format!("{level},scan_overlay={level},hyper=warn,reqwest=warn,notify=warn");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (tests, replay after serve) is not an error.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .try_init();
}
