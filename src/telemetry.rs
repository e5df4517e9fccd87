//! Telemetry logic.
//! Support logging and metrics descriptions. Exporters are left to the
//! embedding service.

use metrics::Unit;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Install a `fmt` subscriber filtered by `RUST_LOG`, or `default_directive`
/// when unset.
pub fn setup_tracing(default_directive: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

/// Describe every metric emitted by the crate to the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "tokens_issued_total",
        Unit::Count,
        "Signed tokens, labelled by kind (access or refresh)."
    );
    metrics::describe_counter!(
        "token_validations_total",
        Unit::Count,
        "Token validations, labelled by outcome."
    );
    metrics::describe_counter!(
        "identity_resolutions_total",
        Unit::Count,
        "Identity store lookups, labelled by outcome."
    );
}
