//! Error types for the permission chain.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PermissionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("permission name must not be empty")]
    EmptyName,
}
