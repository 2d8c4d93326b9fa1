//! One-time passcode authentication.
//!
//! Flow:
//! 1. Patient enters their identity number → `request_challenge`
//! 2. A 6-digit code is generated and handed to the delivery channel
//! 3. Patient types the code → `verify`
//!
//! One challenge per identity at a time; a new request replaces the old one.
//! Challenges expire after 5 minutes and are single-use. Codes are compared
//! in constant time and zeroed when dropped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::config::DispenserConfig;
use crate::delivery::{DeliveryChannel, DeliveryOutcome};
use crate::identity::IdentityDirectory;
use crate::models::{mask_identity, FallbackCodePolicy, PatientIdentity};

/// Number of digits in a passcode.
pub const OTP_CODE_LEN: usize = 6;

// ═══════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════

/// Errors from passcode authentication.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Unknown identity number")]
    UnknownIdentity,
    #[error("No active passcode for this identity")]
    NoActiveChallenge,
    #[error("Passcode expired, request a new one")]
    Expired,
    #[error("Invalid passcode")]
    InvalidCode,
    #[error("A newer passcode was requested for this identity")]
    Superseded,
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// A passcode issued to one identity.
#[derive(Clone)]
pub struct OtpChallenge {
    issued_to: String,
    code: Zeroizing<String>,
    issued_at: DateTime<Utc>,
    consumed: bool,
    delivery: DeliveryOutcome,
}

impl OtpChallenge {
    pub fn issued_to(&self) -> &str {
        &self.issued_to
    }

    /// The generated code. Front ends show it only in demo mode.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Whether the code reached the patient or delivery fell back.
    pub fn delivery(&self) -> &DeliveryOutcome {
        &self.delivery
    }
}

// Code stays out of logs.
impl std::fmt::Debug for OtpChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpChallenge")
            .field("issued_to", &mask_identity(&self.issued_to))
            .field("code", &"******")
            .field("issued_at", &self.issued_at)
            .field("consumed", &self.consumed)
            .field("delivery", &self.delivery)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChallengeState {
    Pending,
    Verified,
    Expired,
}

/// A challenge as held by the authenticator.
struct ActiveChallenge {
    challenge: OtpChallenge,
    patient: PatientIdentity,
    state: ChallengeState,
}

/// A passcode generated but not yet delivered or registered.
///
/// Produced by `prepare_challenge` under the authenticator lock, delivered
/// with the lock released, then handed back to `complete_challenge`.
#[derive(Clone)]
pub struct PendingChallenge {
    seq: u64,
    patient: PatientIdentity,
    code: Zeroizing<String>,
    issued_at: DateTime<Utc>,
}

impl PendingChallenge {
    pub fn patient(&self) -> &PatientIdentity {
        &self.patient
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Hand the code to `channel`. Blocks for as long as the channel does.
    pub fn deliver(&self, channel: &dyn DeliveryChannel) -> DeliveryOutcome {
        channel.deliver(&self.patient.contact, &self.code, &self.patient.name)
    }
}

impl std::fmt::Debug for PendingChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingChallenge")
            .field("seq", &self.seq)
            .field("issued_to", &self.patient.masked_id())
            .field("code", &"******")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════
// OtpAuthenticator
// ═══════════════════════════════════════════════════════════

/// Issues and verifies one-time passcodes against an identity directory.
///
/// Lives in `DispenserState` behind a `Mutex` so issuance and verification
/// for an identity never interleave. Delivery is slow network I/O and runs
/// between `prepare_challenge` and `complete_challenge` with the lock released.
pub struct OtpAuthenticator {
    directory: Arc<dyn IdentityDirectory>,
    delivery: Arc<dyn DeliveryChannel>,
    identity_length: usize,
    ttl: chrono::Duration,
    fallback_code: Zeroizing<String>,
    fallback_policy: FallbackCodePolicy,
    challenges: HashMap<String, ActiveChallenge>,
    /// Issue order; a later request always wins over an earlier one.
    next_seq: u64,
    /// Sequence of the last registered challenge per identity. Outlives the
    /// challenge itself so a slow, older delivery cannot come back later.
    registered_seq: HashMap<String, u64>,
}

impl OtpAuthenticator {
    pub fn new(
        directory: Arc<dyn IdentityDirectory>,
        delivery: Arc<dyn DeliveryChannel>,
        config: &DispenserConfig,
    ) -> Self {
        Self {
            directory,
            delivery,
            identity_length: config.identity_length,
            ttl: config.otp_ttl(),
            fallback_code: Zeroizing::new(config.fallback_code.clone()),
            fallback_policy: config.fallback_policy,
            challenges: HashMap::new(),
            next_seq: 0,
            registered_seq: HashMap::new(),
        }
    }

    /// Issue a new passcode for `identity_id`, stamped with the current time.
    pub fn request_challenge(&mut self, identity_id: &str) -> Result<OtpChallenge, AuthError> {
        self.request_challenge_at(identity_id, Utc::now())
    }

    /// Issue a new passcode for `identity_id`, stamped with `now`.
    ///
    /// Prepare, deliver and register in one call. Holds `&mut self` through
    /// delivery; shared callers use the split steps instead.
    pub fn request_challenge_at(
        &mut self,
        identity_id: &str,
        now: DateTime<Utc>,
    ) -> Result<OtpChallenge, AuthError> {
        let pending = self.prepare_challenge(identity_id, now)?;
        let delivery = pending.deliver(self.delivery.as_ref());
        self.complete_challenge(pending, delivery)
    }

    /// Validate the identity and generate its code. Nothing is registered yet.
    pub fn prepare_challenge(
        &mut self,
        identity_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PendingChallenge, AuthError> {
        let patient = self.resolve(identity_id)?;
        self.next_seq += 1;
        Ok(PendingChallenge {
            seq: self.next_seq,
            patient,
            code: Zeroizing::new(generate_otp_code(&mut rand::thread_rng())),
            issued_at: now,
        })
    }

    /// Register a delivered passcode, replacing any earlier challenge for the
    /// same identity.
    ///
    /// Fails with `Superseded` if a request prepared after this one has
    /// already been registered. The delivery outcome is recorded on the
    /// challenge but never makes it invalid.
    pub fn complete_challenge(
        &mut self,
        pending: PendingChallenge,
        delivery: DeliveryOutcome,
    ) -> Result<OtpChallenge, AuthError> {
        self.purge_verified();

        let newer_exists = self
            .registered_seq
            .get(&pending.patient.id)
            .is_some_and(|&seq| seq > pending.seq);
        if newer_exists {
            tracing::info!(
                identity = %pending.patient.masked_id(),
                "Passcode superseded by a newer request"
            );
            return Err(AuthError::Superseded);
        }

        let PendingChallenge {
            seq,
            patient,
            code,
            issued_at,
        } = pending;

        let challenge = OtpChallenge {
            issued_to: patient.id.clone(),
            code,
            issued_at,
            consumed: false,
            delivery,
        };
        let identity = patient.masked_id();
        self.registered_seq.insert(patient.id.clone(), seq);

        let replaced = self
            .challenges
            .insert(
                patient.id.clone(),
                ActiveChallenge {
                    challenge: challenge.clone(),
                    patient,
                    state: ChallengeState::Pending,
                },
            )
            .is_some_and(|old| old.state == ChallengeState::Pending);

        tracing::info!(
            identity = %identity,
            fallback = challenge.delivery.is_fallback(),
            replaced,
            "Passcode issued"
        );

        Ok(challenge)
    }

    /// Channel used for delivery between the split issuance steps.
    pub fn delivery_channel(&self) -> Arc<dyn DeliveryChannel> {
        Arc::clone(&self.delivery)
    }

    /// Check a submitted passcode.
    ///
    /// Expiry is checked before the code, so a correct code past the window
    /// still fails with `Expired`. A verified challenge cannot verify again.
    pub fn verify(
        &mut self,
        identity_id: &str,
        submitted_code: &str,
        now: DateTime<Utc>,
    ) -> Result<PatientIdentity, AuthError> {
        let entry = self
            .challenges
            .get_mut(identity_id)
            .ok_or(AuthError::NoActiveChallenge)?;

        match entry.state {
            ChallengeState::Verified => return Err(AuthError::NoActiveChallenge),
            ChallengeState::Expired => return Err(AuthError::Expired),
            ChallengeState::Pending => {}
        }

        if now.signed_duration_since(entry.challenge.issued_at) > self.ttl {
            entry.state = ChallengeState::Expired;
            tracing::info!(identity = %mask_identity(identity_id), "Passcode expired");
            return Err(AuthError::Expired);
        }

        let matches_generated = codes_equal(&entry.challenge.code, submitted_code);
        let fallback_allowed = match self.fallback_policy {
            FallbackCodePolicy::Never => false,
            FallbackCodePolicy::WhenDeliveryFellBack => entry.challenge.delivery.is_fallback(),
            FallbackCodePolicy::Always => true,
        };
        let matches_fallback = fallback_allowed && codes_equal(&self.fallback_code, submitted_code);

        if !(matches_generated || matches_fallback) {
            tracing::warn!(identity = %mask_identity(identity_id), "Invalid passcode submitted");
            return Err(AuthError::InvalidCode);
        }

        entry.state = ChallengeState::Verified;
        entry.challenge.consumed = true;
        tracing::info!(
            identity = %mask_identity(identity_id),
            via_fallback = !matches_generated,
            "Passcode verified"
        );
        Ok(entry.patient.clone())
    }

    /// True if `identity_id` holds an unconsumed, unexpired challenge.
    pub fn has_pending(&self, identity_id: &str, now: DateTime<Utc>) -> bool {
        self.challenges.get(identity_id).is_some_and(|entry| {
            entry.state == ChallengeState::Pending
                && now.signed_duration_since(entry.challenge.issued_at) <= self.ttl
        })
    }

    /// Drop the challenge for `identity_id`, if any.
    pub fn cancel(&mut self, identity_id: &str) {
        self.challenges.remove(identity_id);
    }

    /// Validate shape, then look the identity up.
    fn resolve(&self, identity_id: &str) -> Result<PatientIdentity, AuthError> {
        let well_formed = identity_id.len() == self.identity_length
            && identity_id.bytes().all(|b| b.is_ascii_digit());
        if !well_formed {
            tracing::warn!(len = identity_id.len(), "Malformed identity number");
            return Err(AuthError::UnknownIdentity);
        }
        self.directory.lookup(identity_id).ok_or_else(|| {
            tracing::warn!(identity = %mask_identity(identity_id), "Identity not in directory");
            AuthError::UnknownIdentity
        })
    }

    /// Verified challenges behave exactly like absent ones; forget them.
    fn purge_verified(&mut self) {
        self.challenges
            .retain(|_, entry| entry.state != ChallengeState::Verified);
    }
}

impl std::fmt::Debug for OtpAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpAuthenticator")
            .field("challenges", &self.challenges.len())
            .field("fallback_policy", &self.fallback_policy)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════
// Code helpers
// ═══════════════════════════════════════════════════════════

/// Draw a uniformly random 6-digit passcode (leading zeros allowed).
pub fn generate_otp_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{:0width$}", rng.gen_range(0..1_000_000u32), width = OTP_CODE_LEN)
}

/// Constant-time comparison to prevent timing attacks.
fn codes_equal(expected: &str, submitted: &str) -> bool {
    expected.as_bytes().ct_eq(submitted.as_bytes()).into()
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::delivery::MockDelivery;
    use crate::identity::InMemoryDirectory;

    const RAHUL: &str = "123456789012";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap()
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    fn authenticator_with(
        delivery: Arc<MockDelivery>,
        policy: FallbackCodePolicy,
    ) -> OtpAuthenticator {
        let config = DispenserConfig {
            fallback_policy: policy,
            ..DispenserConfig::default()
        };
        OtpAuthenticator::new(
            Arc::new(InMemoryDirectory::with_demo_patients()),
            delivery,
            &config,
        )
    }

    fn authenticator() -> OtpAuthenticator {
        authenticator_with(
            Arc::new(MockDelivery::sending()),
            FallbackCodePolicy::WhenDeliveryFellBack,
        )
    }

    // ── Code generation ───────────────────────────────

    #[test]
    fn otp_code_is_six_digits() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1_000 {
            let code = generate_otp_code(&mut rng);
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn otp_codes_may_start_with_zero() {
        let mut rng = StdRng::seed_from_u64(11);
        let codes: Vec<String> = (0..5_000).map(|_| generate_otp_code(&mut rng)).collect();
        assert!(codes.iter().any(|c| c.starts_with('0')));
    }

    #[test]
    fn constant_time_compare_handles_length_mismatch() {
        assert!(codes_equal("123456", "123456"));
        assert!(!codes_equal("123456", "12345"));
        assert!(!codes_equal("123456", ""));
    }

    // ── Issuance ──────────────────────────────────────

    #[test]
    fn request_for_known_identity_issues_challenge() {
        let delivery = Arc::new(MockDelivery::sending());
        let mut auth =
            authenticator_with(delivery.clone(), FallbackCodePolicy::WhenDeliveryFellBack);
        let challenge = auth.request_challenge_at(RAHUL, t0()).unwrap();

        assert_eq!(challenge.issued_to(), RAHUL);
        assert_eq!(challenge.code().len(), 6);
        assert_eq!(challenge.issued_at(), t0());
        assert!(!challenge.is_consumed());
        assert_eq!(challenge.delivery(), &DeliveryOutcome::Sent);
        assert!(auth.has_pending(RAHUL, t0()));

        let messages = delivery.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].destination, "rahul@example.com");
        assert_eq!(messages[0].recipient_name, "Rahul Kumar");
        assert_eq!(messages[0].code, challenge.code());
    }

    #[test]
    fn unknown_identities_are_rejected() {
        let mut auth = authenticator();
        for id in ["999999999999", "12345678901", "1234567890123", "12345678901a", ""] {
            assert_eq!(
                auth.request_challenge_at(id, t0()).unwrap_err(),
                AuthError::UnknownIdentity,
                "id {id:?}"
            );
        }
    }

    #[test]
    fn fallback_delivery_still_issues_valid_challenge() {
        let mut auth = authenticator_with(
            Arc::new(MockDelivery::falling_back()),
            FallbackCodePolicy::WhenDeliveryFellBack,
        );
        let challenge = auth.request_challenge_at(RAHUL, t0()).unwrap();
        assert!(challenge.delivery().is_fallback());
        let patient = auth.verify(RAHUL, challenge.code(), t0() + secs(10)).unwrap();
        assert_eq!(patient.name, "Rahul Kumar");
    }

    #[test]
    fn new_request_invalidates_previous_code() {
        let mut auth = authenticator();
        let first = auth.request_challenge_at(RAHUL, t0()).unwrap();
        let second = auth.request_challenge_at(RAHUL, t0() + secs(30)).unwrap();

        if first.code() != second.code() {
            assert_eq!(
                auth.verify(RAHUL, first.code(), t0() + secs(40)).unwrap_err(),
                AuthError::InvalidCode
            );
        }
        assert!(auth.verify(RAHUL, second.code(), t0() + secs(40)).is_ok());
    }

    #[test]
    fn new_request_restarts_expiry_window() {
        let mut auth = authenticator();
        auth.request_challenge_at(RAHUL, t0()).unwrap();
        let second = auth.request_challenge_at(RAHUL, t0() + secs(240)).unwrap();
        assert!(auth.verify(RAHUL, second.code(), t0() + secs(400)).is_ok());
    }

    #[test]
    fn challenges_are_per_identity() {
        let mut auth = authenticator();
        let rahul = auth.request_challenge_at(RAHUL, t0()).unwrap();
        let priya = auth.request_challenge_at("234567890123", t0()).unwrap();
        assert!(auth.verify(RAHUL, rahul.code(), t0()).is_ok());
        assert!(auth.verify("234567890123", priya.code(), t0()).is_ok());
    }

    // ── Verification ──────────────────────────────────

    #[test]
    fn verify_without_request_fails() {
        let mut auth = authenticator();
        assert_eq!(
            auth.verify(RAHUL, "123456", t0()).unwrap_err(),
            AuthError::NoActiveChallenge
        );
    }

    #[test]
    fn challenge_is_single_use() {
        let mut auth = authenticator();
        let challenge = auth.request_challenge_at(RAHUL, t0()).unwrap();
        auth.verify(RAHUL, challenge.code(), t0() + secs(5)).unwrap();
        assert_eq!(
            auth.verify(RAHUL, challenge.code(), t0() + secs(6)).unwrap_err(),
            AuthError::NoActiveChallenge
        );
        assert!(!auth.has_pending(RAHUL, t0() + secs(6)));
    }

    #[test]
    fn wrong_code_is_rejected_and_challenge_survives() {
        let mut auth = authenticator();
        let challenge = auth.request_challenge_at(RAHUL, t0()).unwrap();
        let wrong = if challenge.code() == "000000" { "000001" } else { "000000" };
        assert_eq!(
            auth.verify(RAHUL, wrong, t0() + secs(1)).unwrap_err(),
            AuthError::InvalidCode
        );
        assert!(auth.verify(RAHUL, challenge.code(), t0() + secs(2)).is_ok());
    }

    #[test]
    fn correct_code_after_window_is_expired() {
        let mut auth = authenticator();
        let challenge = auth.request_challenge_at(RAHUL, t0()).unwrap();
        assert_eq!(
            auth.verify(RAHUL, challenge.code(), t0() + secs(301)).unwrap_err(),
            AuthError::Expired
        );
        // Expired stays expired, even if the clock is wound back.
        assert_eq!(
            auth.verify(RAHUL, challenge.code(), t0() + secs(10)).unwrap_err(),
            AuthError::Expired
        );
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let mut auth = authenticator();
        let challenge = auth.request_challenge_at(RAHUL, t0()).unwrap();
        assert!(auth.verify(RAHUL, challenge.code(), t0() + secs(300)).is_ok());
    }

    #[test]
    fn expiry_is_checked_before_code() {
        let mut auth = authenticator();
        auth.request_challenge_at(RAHUL, t0()).unwrap();
        assert_eq!(
            auth.verify(RAHUL, "not-a-code", t0() + secs(600)).unwrap_err(),
            AuthError::Expired
        );
    }

    #[test]
    fn cancel_discards_challenge() {
        let mut auth = authenticator();
        let challenge = auth.request_challenge_at(RAHUL, t0()).unwrap();
        auth.cancel(RAHUL);
        assert_eq!(
            auth.verify(RAHUL, challenge.code(), t0()).unwrap_err(),
            AuthError::NoActiveChallenge
        );
    }

    // ── Fallback code policy ──────────────────────────

    #[test]
    fn fallback_code_accepted_when_delivery_fell_back() {
        let mut auth = authenticator_with(
            Arc::new(MockDelivery::falling_back()),
            FallbackCodePolicy::WhenDeliveryFellBack,
        );
        auth.request_challenge_at(RAHUL, t0()).unwrap();
        assert!(auth.verify(RAHUL, "123456", t0() + secs(1)).is_ok());
    }

    #[test]
    fn fallback_code_rejected_when_delivery_sent() {
        let mut auth = authenticator();
        let challenge = auth.request_challenge_at(RAHUL, t0()).unwrap();
        if challenge.code() != "123456" {
            assert_eq!(
                auth.verify(RAHUL, "123456", t0() + secs(1)).unwrap_err(),
                AuthError::InvalidCode
            );
        }
    }

    #[test]
    fn fallback_code_never_accepted_under_never_policy() {
        let mut auth = authenticator_with(
            Arc::new(MockDelivery::falling_back()),
            FallbackCodePolicy::Never,
        );
        let challenge = auth.request_challenge_at(RAHUL, t0()).unwrap();
        if challenge.code() != "123456" {
            assert_eq!(
                auth.verify(RAHUL, "123456", t0() + secs(1)).unwrap_err(),
                AuthError::InvalidCode
            );
        }
    }

    #[test]
    fn fallback_code_always_accepted_under_always_policy() {
        let mut auth =
            authenticator_with(Arc::new(MockDelivery::sending()), FallbackCodePolicy::Always);
        auth.request_challenge_at(RAHUL, t0()).unwrap();
        assert!(auth.verify(RAHUL, "123456", t0() + secs(1)).is_ok());
    }

    #[test]
    fn fallback_code_cannot_bypass_expiry() {
        let mut auth =
            authenticator_with(Arc::new(MockDelivery::sending()), FallbackCodePolicy::Always);
        auth.request_challenge_at(RAHUL, t0()).unwrap();
        assert_eq!(
            auth.verify(RAHUL, "123456", t0() + secs(301)).unwrap_err(),
            AuthError::Expired
        );
    }

    // ── Split issuance ────────────────────────────────

    #[test]
    fn split_issuance_registers_delivered_code() {
        let delivery = Arc::new(MockDelivery::sending());
        let mut auth =
            authenticator_with(delivery.clone(), FallbackCodePolicy::WhenDeliveryFellBack);

        let pending = auth.prepare_challenge(RAHUL, t0()).unwrap();
        assert!(!auth.has_pending(RAHUL, t0()));

        let outcome = pending.deliver(delivery.as_ref());
        let challenge = auth.complete_challenge(pending, outcome).unwrap();

        assert_eq!(delivery.messages()[0].code, challenge.code());
        assert!(auth.verify(RAHUL, challenge.code(), t0() + secs(5)).is_ok());
    }

    #[test]
    fn older_delivery_cannot_return_after_newer_code_was_used() {
        let mut auth = authenticator();
        let older = auth.prepare_challenge(RAHUL, t0()).unwrap();
        let newer = auth.prepare_challenge(RAHUL, t0()).unwrap();

        let newer = auth.complete_challenge(newer, DeliveryOutcome::Sent).unwrap();
        auth.verify(RAHUL, newer.code(), t0() + secs(1)).unwrap();

        assert_eq!(
            auth.complete_challenge(older, DeliveryOutcome::Sent).unwrap_err(),
            AuthError::Superseded
        );
        assert!(!auth.has_pending(RAHUL, t0() + secs(2)));
    }

    #[test]
    fn prepare_rejects_unknown_identity() {
        let mut auth = authenticator();
        assert_eq!(
            auth.prepare_challenge("999999999999", t0()).unwrap_err(),
            AuthError::UnknownIdentity
        );
    }

    #[test]
    fn later_request_wins_when_deliveries_finish_out_of_order() {
        let mut auth = authenticator();
        let older = auth.prepare_challenge(RAHUL, t0()).unwrap();
        let newer = auth.prepare_challenge(RAHUL, t0() + secs(1)).unwrap();

        let newer = auth.complete_challenge(newer, DeliveryOutcome::Sent).unwrap();
        assert_eq!(
            auth.complete_challenge(older, DeliveryOutcome::Sent).unwrap_err(),
            AuthError::Superseded
        );
        assert!(auth.verify(RAHUL, newer.code(), t0() + secs(2)).is_ok());
    }

    #[test]
    fn later_request_replaces_when_deliveries_finish_in_order() {
        let mut auth = authenticator();
        let older = auth.prepare_challenge(RAHUL, t0()).unwrap();
        let newer = auth.prepare_challenge(RAHUL, t0() + secs(1)).unwrap();

        let older = auth.complete_challenge(older, DeliveryOutcome::Sent).unwrap();
        let newer = auth.complete_challenge(newer, DeliveryOutcome::Sent).unwrap();

        if older.code() != newer.code() {
            assert_eq!(
                auth.verify(RAHUL, older.code(), t0() + secs(2)).unwrap_err(),
                AuthError::InvalidCode
            );
        }
        assert!(auth.verify(RAHUL, newer.code(), t0() + secs(2)).is_ok());
    }

    #[test]
    fn pending_debug_hides_code() {
        let mut auth = authenticator();
        let pending = auth.prepare_challenge(RAHUL, t0()).unwrap();
        let debug = format!("{pending:?}");
        assert!(!debug.contains(pending.code.as_str()));
        assert!(debug.contains("********9012"));
    }

    #[test]
    fn debug_output_hides_code() {
        let mut auth = authenticator();
        let challenge = auth.request_challenge_at(RAHUL, t0()).unwrap();
        let debug = format!("{challenge:?}");
        assert!(!debug.contains(challenge.code()));
        assert!(debug.contains("********9012"));
    }
}
