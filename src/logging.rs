use std::io;
use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::filter::FilterFn;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Console filter when `RUST_LOG` is not set. The console is shared with the
/// interactive prompt, so only warnings get through by default.
pub const DEFAULT_CONSOLE_FILTER: &str = "warn,sqlx=off";

const FILE_FILTER: &str = "info,remote_call=debug,session=debug,bookmarks=debug,sqlx=info";

pub fn configure_logging() {
    // Connection pool chatter from hyper is never useful here
    let quiet_pool = FilterFn::new(|metadata| {
        !(metadata.level() >= &Level::DEBUG && metadata.target().starts_with("hyper_util"))
    });

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_CONSOLE_FILTER));

    let console_log = fmt::layer()
        .with_writer(io::stderr)
        .with_filter(console_filter)
        .with_filter(quiet_pool);

    let file_appender = rolling::daily("logs", "erblogx.log");
    let file_log = fmt::layer()
        .with_ansi(false)
        .with_writer(file_appender)
        .with_filter(EnvFilter::new(FILE_FILTER));

    tracing_subscriber::Registry::default()
        .with(console_log)
        .with(file_log)
        .init();
}
