use tracing::Level;

/// Install a stderr subscriber when `WRANGLER_LOG=debug`; otherwise leave tracing
/// without a subscriber so every event is discarded.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init_logging(debug: bool) {
    if !debug {
        return;
    }
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
