//! Bridge error taxonomy.
//!
//! Unmapped events are not errors — handlers return `Ok` having done
//! nothing. Coalesced races likewise never surface here. What remains:
//! rejections from either protocol (logged, never auto-retried),
//! provisioning failures (abort the triggering flow), and store failures.

use crate::irc::IrcError;
use crate::matrix::MatrixError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error("remote rejected: {0}")]
    RemoteRejection(String),

    #[error(transparent)]
    Irc(#[from] IrcError),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
