//! Prescription pipeline: one patient session from login to finalized record.
//!
//! ```text
//! Unauthenticated → Authenticated → DraftSubmitted → DraftEditable → Finalized → Idle
//!                                        ↑                 │                      │
//!                                        └─────────────────┴──────────────────────┘
//!                                                    (submit again)
//! ```
//!
//! Each `PrescriptionPipeline` owns its `SessionContext`; the authenticator
//! and history are shared through `DispenserState`.

pub mod parser;
pub mod recognition;

use std::sync::Arc;

use chrono::{Local, NaiveDateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::codes;
use crate::core_state::{CoreError, DispenserState};
use crate::models::{
    MedicineEntry, PatientIdentity, PipelineStage, PrescriptionRecord, PrescriptionSummary,
    RECORD_ID_FORMAT,
};
use crate::delivery::{DeliveryChannel, DeliveryOutcome};
use crate::otp::{AuthError, OtpChallenge, PendingChallenge};
use crate::store::PrescriptionStore;
use recognition::{RecognitionOutcome, TextRecognizer};

/// Redraws allowed when a numeric code collides with one already stored.
const MAX_CODE_ATTEMPTS: usize = 16;

// ═══════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Cannot {action} while {stage}")]
    InvalidStage {
        action: &'static str,
        stage: PipelineStage,
    },
    #[error("Prescription needs at least one medicine")]
    EmptyDraft,
    #[error("No medicine at position {index} (draft has {len})")]
    EntryOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Internal lock error")]
    LockPoisoned,
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::LockPoisoned => Self::LockPoisoned,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Session context
// ═══════════════════════════════════════════════════════════

/// Per-session state. Never shared between sessions; reset on logout.
#[derive(Debug, Clone)]
pub struct SessionContext {
    session_id: Uuid,
    patient: Option<PatientIdentity>,
    /// Identity the last passcode was requested for.
    pending_identity: Option<String>,
    draft: Vec<MedicineEntry>,
    stage: PipelineStage,
    last_record: Option<PrescriptionRecord>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            patient: None,
            pending_identity: None,
            draft: Vec::new(),
            stage: PipelineStage::Unauthenticated,
            last_record: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn patient(&self) -> Option<&PatientIdentity> {
        self.patient.as_ref()
    }

    pub fn draft(&self) -> &[MedicineEntry] {
        &self.draft
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// PrescriptionPipeline
// ═══════════════════════════════════════════════════════════

pub struct PrescriptionPipeline {
    state: Arc<DispenserState>,
    session: SessionContext,
}

impl PrescriptionPipeline {
    pub fn new(state: Arc<DispenserState>) -> Self {
        Self {
            state,
            session: SessionContext::new(),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn stage(&self) -> PipelineStage {
        self.session.stage
    }

    /// The logged-in patient, if any.
    pub fn current_patient(&self) -> Option<&PatientIdentity> {
        self.session.patient.as_ref()
    }

    pub fn draft(&self) -> &[MedicineEntry] {
        &self.session.draft
    }

    /// Record produced by the last `finalize`, until `finish` or logout.
    pub fn last_record(&self) -> Option<&PrescriptionRecord> {
        self.session.last_record.as_ref()
    }

    // ── Authentication ──────────────────────────────────────

    /// Issue a passcode for `identity_id` and remember it for `login`.
    ///
    /// The authenticator lock is released while the code is delivered, so a
    /// slow channel never stalls other sessions. Delivery blocks the calling
    /// thread; async callers use `request_otp_async`.
    pub fn request_otp(&mut self, identity_id: &str) -> Result<OtpChallenge, PipelineError> {
        let (pending, channel) = self.prepare_otp(identity_id)?;
        let delivery = pending.deliver(channel.as_ref());
        self.complete_otp(identity_id, pending, delivery)
    }

    /// `request_otp` for async front ends: delivery runs on the blocking pool.
    pub async fn request_otp_async(
        &mut self,
        identity_id: &str,
    ) -> Result<OtpChallenge, PipelineError> {
        let (pending, channel) = self.prepare_otp(identity_id)?;

        let task_pending = pending.clone();
        let delivery =
            tokio::task::spawn_blocking(move || task_pending.deliver(channel.as_ref()))
                .await
                .unwrap_or_else(|join_err| {
                    tracing::warn!(error = %join_err, "Passcode delivery worker crashed");
                    DeliveryOutcome::Fallback {
                        reason: format!("Delivery worker failed: {join_err}"),
                    }
                });

        self.complete_otp(identity_id, pending, delivery)
    }

    fn prepare_otp(
        &self,
        identity_id: &str,
    ) -> Result<(PendingChallenge, Arc<dyn DeliveryChannel>), PipelineError> {
        self.require_stage("request a passcode", &[PipelineStage::Unauthenticated])?;
        let mut auth = self.state.lock_authenticator()?;
        let pending = auth.prepare_challenge(identity_id, Utc::now())?;
        Ok((pending, auth.delivery_channel()))
    }

    fn complete_otp(
        &mut self,
        identity_id: &str,
        pending: PendingChallenge,
        delivery: DeliveryOutcome,
    ) -> Result<OtpChallenge, PipelineError> {
        let challenge = self
            .state
            .lock_authenticator()?
            .complete_challenge(pending, delivery)?;
        self.session.pending_identity = Some(identity_id.to_string());
        Ok(challenge)
    }

    /// Verify the passcode for the identity of the last `request_otp`.
    pub fn login(&mut self, submitted_code: &str) -> Result<&PatientIdentity, PipelineError> {
        self.login_at(submitted_code, Utc::now())
    }

    pub fn login_at(
        &mut self,
        submitted_code: &str,
        now: chrono::DateTime<Utc>,
    ) -> Result<&PatientIdentity, PipelineError> {
        self.require_stage("log in", &[PipelineStage::Unauthenticated])?;
        let identity_id = self
            .session
            .pending_identity
            .clone()
            .ok_or(AuthError::NoActiveChallenge)?;

        let patient = self
            .state
            .lock_authenticator()?
            .verify(&identity_id, submitted_code, now)?;

        self.session.pending_identity = None;
        self.transition(PipelineStage::Authenticated);
        tracing::info!(
            session = %self.session.session_id,
            identity = %patient.masked_id(),
            "Patient logged in"
        );
        Ok(&*self.session.patient.insert(patient))
    }

    /// Drop the session: patient, draft and stage all reset.
    pub fn logout(&mut self) {
        if let Some(patient) = &self.session.patient {
            tracing::info!(
                session = %self.session.session_id,
                identity = %patient.masked_id(),
                "Patient logged out"
            );
        }
        self.session = SessionContext::new();
    }

    // ── Draft submission ────────────────────────────────────

    /// Parse recognized text into a fresh draft, replacing any earlier one.
    pub fn submit_text(&mut self, text: &str) -> Result<&[MedicineEntry], PipelineError> {
        self.require_submittable()?;
        self.transition(PipelineStage::DraftSubmitted);
        self.accept_parsed(text);
        Ok(self.session.draft.as_slice())
    }

    /// Run text recognition on a prescription photo, then parse the result.
    ///
    /// Recognition failure or timeout never fails the call: the draft falls
    /// back to a single blank entry for the patient to fill in.
    pub async fn submit_image(
        &mut self,
        recognizer: Arc<dyn TextRecognizer>,
        image_bytes: Vec<u8>,
    ) -> Result<RecognitionOutcome, PipelineError> {
        self.require_submittable()?;
        self.transition(PipelineStage::DraftSubmitted);

        let timeout = self.state.config().recognition_timeout();
        let outcome = recognition::recognize_text(recognizer, image_bytes, timeout).await;
        self.accept_parsed(outcome.text());
        Ok(outcome)
    }

    fn accept_parsed(&mut self, text: &str) {
        self.session.draft = parser::parse_medicines(text);
        self.session.last_record = None;
        tracing::debug!(
            session = %self.session.session_id,
            entries = self.session.draft.len(),
            "Draft parsed"
        );
        self.transition(PipelineStage::DraftEditable);
    }

    // ── Draft editing ───────────────────────────────────────

    /// Append a `New Medicine` entry and return its index.
    pub fn add_entry(&mut self) -> Result<usize, PipelineError> {
        self.require_editable("add a medicine")?;
        self.session.draft.push(MedicineEntry::blank());
        Ok(self.session.draft.len() - 1)
    }

    /// Replace the entry at `index`.
    pub fn update_entry(&mut self, index: usize, entry: MedicineEntry) -> Result<(), PipelineError> {
        self.require_editable("edit a medicine")?;
        let len = self.session.draft.len();
        let slot = self
            .session
            .draft
            .get_mut(index)
            .ok_or(PipelineError::EntryOutOfRange { index, len })?;
        *slot = entry;
        Ok(())
    }

    /// Remove and return the entry at `index`. The draft may become empty.
    pub fn delete_entry(&mut self, index: usize) -> Result<MedicineEntry, PipelineError> {
        self.require_editable("delete a medicine")?;
        let len = self.session.draft.len();
        if index >= len {
            return Err(PipelineError::EntryOutOfRange { index, len });
        }
        Ok(self.session.draft.remove(index))
    }

    // ── Finalization ────────────────────────────────────────

    /// Freeze the draft into a stored prescription, stamped with local time.
    pub fn finalize(&mut self) -> Result<PrescriptionRecord, PipelineError> {
        self.finalize_at(Local::now().naive_local())
    }

    pub fn finalize_at(
        &mut self,
        created_at: NaiveDateTime,
    ) -> Result<PrescriptionRecord, PipelineError> {
        let patient = self.require_editable("finalize")?.clone();
        if self.session.draft.is_empty() {
            return Err(PipelineError::EmptyDraft);
        }

        let record = {
            let mut store = self.state.write_store()?;
            let id = unique_record_id(&store, created_at);
            let numeric_code = unique_numeric_code(&store, &mut rand::thread_rng());
            let record = PrescriptionRecord::new(
                id,
                &patient,
                created_at,
                self.session.draft.clone(),
                numeric_code,
            );
            store.append(&patient.id, record.clone());
            record
        };

        tracing::info!(
            session = %self.session.session_id,
            identity = %patient.masked_id(),
            record_id = record.id(),
            medicines = record.medicines().len(),
            "Prescription finalized"
        );
        self.session.last_record = Some(record.clone());
        self.transition(PipelineStage::Finalized);
        Ok(record)
    }

    /// Leave the finalized screen: clear the draft, ready for the next one.
    pub fn finish(&mut self) -> Result<(), PipelineError> {
        self.require_patient()?;
        self.require_stage("finish", &[PipelineStage::Finalized])?;
        self.session.draft.clear();
        self.session.last_record = None;
        self.transition(PipelineStage::Idle);
        Ok(())
    }

    // ── History ─────────────────────────────────────────────

    /// The patient's prescriptions, most recent first.
    pub fn history(&self) -> Result<Vec<PrescriptionRecord>, PipelineError> {
        let patient = self.require_patient()?;
        Ok(self.state.read_store()?.list_for(&patient.id))
    }

    pub fn history_summaries(&self) -> Result<Vec<PrescriptionSummary>, PipelineError> {
        let patient = self.require_patient()?;
        Ok(self.state.read_store()?.summaries_for(&patient.id))
    }

    // ── Guards ──────────────────────────────────────────────

    fn require_patient(&self) -> Result<&PatientIdentity, PipelineError> {
        self.session
            .patient
            .as_ref()
            .ok_or(PipelineError::NotAuthenticated)
    }

    fn require_stage(
        &self,
        action: &'static str,
        allowed: &[PipelineStage],
    ) -> Result<(), PipelineError> {
        if allowed.contains(&self.session.stage) {
            Ok(())
        } else {
            Err(PipelineError::InvalidStage {
                action,
                stage: self.session.stage,
            })
        }
    }

    /// DraftSubmitted is allowed so an interrupted recognition can be retried.
    fn require_submittable(&self) -> Result<(), PipelineError> {
        self.require_patient()?;
        self.require_stage(
            "submit a prescription",
            &[
                PipelineStage::Authenticated,
                PipelineStage::DraftSubmitted,
                PipelineStage::DraftEditable,
                PipelineStage::Idle,
            ],
        )
    }

    fn require_editable(&self, action: &'static str) -> Result<&PatientIdentity, PipelineError> {
        let patient = self.require_patient()?;
        self.require_stage(action, &[PipelineStage::DraftEditable])?;
        Ok(patient)
    }

    fn transition(&mut self, next: PipelineStage) {
        tracing::debug!(
            session = %self.session.session_id,
            from = %self.session.stage,
            to = %next,
            "Pipeline stage change"
        );
        self.session.stage = next;
    }
}

impl std::fmt::Debug for PrescriptionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrescriptionPipeline")
            .field("session_id", &self.session.session_id)
            .field("stage", &self.session.stage)
            .field("draft_len", &self.session.draft.len())
            .finish()
    }
}

/// Compact timestamp id, suffixed `-2`, `-3`, ... if any record in the
/// store already carries it. Ids are unique across all patients.
fn unique_record_id(store: &PrescriptionStore, created_at: NaiveDateTime) -> String {
    let base = created_at.format(RECORD_ID_FORMAT).to_string();
    if !store.contains_record_id(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !store.contains_record_id(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Numeric code not yet used by any stored record.
///
/// Every draw is checked. If all `MAX_CODE_ATTEMPTS` draws collide the last
/// one is returned anyway and the collision logged.
fn unique_numeric_code<R: Rng + ?Sized>(store: &PrescriptionStore, rng: &mut R) -> String {
    let mut code = String::new();
    for _ in 0..MAX_CODE_ATTEMPTS {
        code = codes::numeric_code(rng);
        if !store.contains_code(&code) {
            return code;
        }
    }
    tracing::warn!(
        attempts = MAX_CODE_ATTEMPTS,
        "Every numeric code draw collided with a stored record"
    );
    code
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
