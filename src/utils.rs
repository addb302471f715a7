//! Shared helpers that do not belong to a single module.

/// logging configuration for development
pub fn logging_setup(max_level: tracing::Level) {
    use tracing_subscriber::{filter, prelude::*};

    let filter = filter::filter_fn(move |meta| *meta.level() <= max_level);

    let terminal_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_file(false)
        .with_target(false)
        .without_time()
        .with_thread_names(false)
        .with_filter(filter);

    tracing_subscriber::registry().with(terminal_log).init();
}
