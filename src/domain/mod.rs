pub mod applicant;
pub mod credentials;
pub mod email;
