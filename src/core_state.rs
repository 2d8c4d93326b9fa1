//! Shared dispenser state.
//!
//! One `DispenserState` is wrapped in `Arc` at startup and handed to every
//! `PrescriptionPipeline`, so any number of patient sessions share the same
//! authenticator and history.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::DispenserConfig;
use crate::delivery::{DeliveryChannel, DeliveryError, DemoDelivery, WebhookDelivery};
use crate::identity::{IdentityDirectory, InMemoryDirectory};
use crate::models::PrescriptionRecord;
use crate::otp::OtpAuthenticator;
use crate::store::PrescriptionStore;

// ═══════════════════════════════════════════════════════════
// DispenserState
// ═══════════════════════════════════════════════════════════

/// Process-wide state shared by all sessions.
///
/// The authenticator sits behind a `Mutex` because issuing and verifying
/// both mutate the challenge table. The store uses `RwLock`: history reads
/// are far more common than finalizations.
pub struct DispenserState {
    config: DispenserConfig,
    directory: Arc<dyn IdentityDirectory>,
    authenticator: Mutex<OtpAuthenticator>,
    store: RwLock<PrescriptionStore>,
}

impl DispenserState {
    pub fn new(
        config: DispenserConfig,
        directory: Arc<dyn IdentityDirectory>,
        delivery: Arc<dyn DeliveryChannel>,
    ) -> Self {
        let authenticator = OtpAuthenticator::new(Arc::clone(&directory), delivery, &config);
        Self {
            config,
            directory,
            authenticator: Mutex::new(authenticator),
            store: RwLock::new(PrescriptionStore::new()),
        }
    }

    /// State over the demo directory, delivering through the configured
    /// webhook or in demo mode when none is set.
    ///
    /// Builds a blocking HTTP client, so call this before entering an async
    /// runtime.
    pub fn from_config(config: DispenserConfig) -> Result<Self, DeliveryError> {
        let delivery: Arc<dyn DeliveryChannel> = match config.delivery_webhook_url.as_deref() {
            Some(url) => {
                let validity_minutes = (config.otp_ttl_secs / 60).max(1);
                Arc::new(WebhookDelivery::new(
                    url,
                    config.delivery_timeout_secs,
                    validity_minutes,
                )?)
            }
            None => {
                tracing::warn!("No delivery webhook configured, passcodes run in demo mode");
                Arc::new(DemoDelivery)
            }
        };
        Ok(Self::new(
            config,
            Arc::new(InMemoryDirectory::with_demo_patients()),
            delivery,
        ))
    }

    pub fn config(&self) -> &DispenserConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<dyn IdentityDirectory> {
        &self.directory
    }

    /// Lock the authenticator for exclusive access.
    pub fn lock_authenticator(&self) -> Result<MutexGuard<'_, OtpAuthenticator>, CoreError> {
        self.authenticator.lock().map_err(|_| CoreError::LockPoisoned)
    }

    /// Read access to prescription history.
    pub fn read_store(&self) -> Result<RwLockReadGuard<'_, PrescriptionStore>, CoreError> {
        self.store.read().map_err(|_| CoreError::LockPoisoned)
    }

    /// Write access to prescription history.
    pub fn write_store(&self) -> Result<RwLockWriteGuard<'_, PrescriptionStore>, CoreError> {
        self.store.write().map_err(|_| CoreError::LockPoisoned)
    }

    /// Pharmacist redemption: the record carrying `numeric_code`, if any.
    pub fn find_by_code(&self, numeric_code: &str) -> Result<Option<PrescriptionRecord>, CoreError> {
        Ok(self.read_store()?.find_by_code(numeric_code))
    }
}

impl Default for DispenserState {
    /// Default config, demo directory, demo delivery. Never touches the network.
    fn default() -> Self {
        Self::new(
            DispenserConfig::default(),
            Arc::new(InMemoryDirectory::with_demo_patients()),
            Arc::new(DemoDelivery),
        )
    }
}

impl std::fmt::Debug for DispenserState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispenserState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════
// Error types
// ═══════════════════════════════════════════════════════════

/// Errors from DispenserState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_has_empty_store() {
        let state = DispenserState::default();
        assert!(state.read_store().unwrap().is_empty());
    }

    #[test]
    fn default_state_knows_demo_patients() {
        let state = DispenserState::default();
        assert!(state.directory().lookup("345678901234").is_some());
    }

    #[test]
    fn from_config_without_webhook_uses_demo_delivery() {
        let state = DispenserState::from_config(DispenserConfig::default()).unwrap();
        let challenge = state
            .lock_authenticator()
            .unwrap()
            .request_challenge("123456789012")
            .unwrap();
        assert!(challenge.delivery().is_fallback());
    }

    #[test]
    fn from_config_rejects_bad_webhook() {
        let config = DispenserConfig {
            delivery_webhook_url: Some("ftp://relay.example.com".into()),
            ..DispenserConfig::default()
        };
        assert!(matches!(
            DispenserState::from_config(config),
            Err(DeliveryError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn concurrent_reads_do_not_block() {
        use std::thread;

        let state = Arc::new(DispenserState::default());
        let mut handles = vec![];

        for _ in 0..10 {
            let state = Arc::clone(&state);
            handles.push(thread::spawn(move || {
                let guard = state.read_store().unwrap();
                assert_eq!(guard.count_for("123456789012"), 0);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn poisoned_store_lock_is_reported() {
        let state = Arc::new(DispenserState::default());
        let poisoner = Arc::clone(&state);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.store.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(matches!(state.read_store(), Err(CoreError::LockPoisoned)));
    }
}
