//! Result alias for call operations

use super::error::DomainError;

pub type Result<T, E = DomainError> = std::result::Result<T, E>;
