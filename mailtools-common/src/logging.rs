//! Event macros and the global subscriber.
//!
//! Events are grouped into three spans: `internal` for local state such as
//! spool transitions, `incoming` and `outgoing` for QMQP traffic. Traffic
//! events may carry the remote address as a `peer` span field. Raw
//! netstrings are rendered through [`Wire`].

use std::{fmt, str::FromStr};

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Target prefix every mailtools crate logs under.
pub const TARGET_PREFIX: &str = "mailtools";

/// Bytes of a payload shown before [`Wire`] truncates.
pub const WIRE_PREVIEW: usize = 64;

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, peer = $peer:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span, peer = %$peer);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};

    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// Bytes written to a peer.
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, peer = $peer:expr, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", peer = $peer, $($msg),*)
    };

    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    (peer = $peer:expr, $($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, peer = $peer, $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

/// Bytes read from a peer.
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, peer = $peer:expr, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", peer = $peer, $($msg),*)
    };

    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    (peer = $peer:expr, $($msg:expr),*) => {
        $crate::incoming!(level = TRACE, peer = $peer, $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

/// Local state changes: spool transitions, listener lifecycle.
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Display adapter for protocol bytes: printable ASCII as is, everything
/// else escaped, cut off after [`WIRE_PREVIEW`] bytes with a count of
/// what was left out.
#[derive(Debug, Clone, Copy)]
pub struct Wire<'a>(pub &'a [u8]);

impl fmt::Display for Wire<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.0[..self.0.len().min(WIRE_PREVIEW)];
        write!(f, "{}", shown.escape_ascii())?;

        match self.0.len() - shown.len() {
            0 => Ok(()),
            hidden => write!(f, "... (+{hidden} bytes)"),
        }
    }
}

fn level_from(value: Option<&str>, default: LevelFilter) -> LevelFilter {
    value.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Install the global subscriber. `LOG_LEVEL` overrides the default of
/// `TRACE` (debug builds) or `INFO` (release builds).
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let level = level_from(std::env::var("LOG_LEVEL").ok().as_deref(), default);

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with(TARGET_PREFIX)
                })),
        )
        .init();
}
