use anyhow::Result;

use crate::domain::applicant::{Applicant, ApplicantId, NewApplicant};

/// Applicant records are append-only from the intake handler's view.
pub trait ApplicantRepository: Send + Sync {
    fn create(&self, applicant: &NewApplicant) -> Result<Applicant>;

    fn get(&self, id: ApplicantId) -> Result<Option<Applicant>>;
    fn count(&self) -> Result<u64>;
}
