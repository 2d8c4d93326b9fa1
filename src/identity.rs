//! Patient identity directory.
//!
//! The directory is reference data owned elsewhere (a national id registry in
//! production). The core only looks identities up.

use std::collections::HashMap;

use crate::models::PatientIdentity;

/// Identity lookup abstraction (allows swapping the registry in tests).
pub trait IdentityDirectory: Send + Sync {
    fn lookup(&self, identity_id: &str) -> Option<PatientIdentity>;
}

/// Directory held in memory, keyed by identity id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
    patients: HashMap<String, PatientIdentity>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory seeded with the demo patients used for local trials.
    pub fn with_demo_patients() -> Self {
        let mut dir = Self::new();
        for (id, name, contact) in [
            ("123456789012", "Rahul Kumar", "rahul@example.com"),
            ("234567890123", "Priya Sharma", "priya@example.com"),
            ("345678901234", "Amit Patel", "amit@example.com"),
            ("456789012345", "Sneha Reddy", "sneha@example.com"),
            ("567890123456", "Rajesh Singh", "rajesh@example.com"),
        ] {
            dir.insert(PatientIdentity::new(id, name, contact));
        }
        dir
    }

    pub fn insert(&mut self, patient: PatientIdentity) {
        self.patients.insert(patient.id.clone(), patient);
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }
}

impl IdentityDirectory for InMemoryDirectory {
    fn lookup(&self, identity_id: &str) -> Option<PatientIdentity> {
        self.patients.get(identity_id).cloned()
    }
}
