use thiserror::Error;

#[derive(Error, Debug)]
pub enum CertError {
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),
    #[error("Invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("Invalid key")]
    InvalidKey,
    #[error("Signing failed: {0}")]
    SigningFailed(String),
    #[error("Verification failed: {0}")]
    VerificationFailed(String),
}

pub type Result<T> = std::result::Result<T, CertError>;
