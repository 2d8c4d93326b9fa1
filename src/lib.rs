pub mod config;
pub mod models;
pub mod codes;
pub mod identity;
pub mod delivery; // Passcode delivery channels
pub mod otp; // One-time passcode authentication
pub mod store; // Per-patient prescription history
pub mod core_state; // Shared state across sessions
pub mod pipeline;

use tracing_subscriber::EnvFilter;

pub use core_state::DispenserState;
pub use pipeline::{PipelineError, PrescriptionPipeline};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Calling this twice is harmless: the second
/// install fails quietly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
