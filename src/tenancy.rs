use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    repository::LedgerStore,
};

/// Identifier of the business that owns every row a calculator touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessId(Uuid);

impl BusinessId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for BusinessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Parse a client-supplied identifier, reporting the field on failure.
pub fn parse_id(raw: &str, field: &str) -> AppResult<Uuid> {
    Uuid::try_parse(raw.trim())
        .map_err(|_| AppError::BadRequest(format!("Invalid {field}: '{}'.", raw.trim())))
}

/// Resolve the business scope for a request. Unknown businesses read as
/// not found so callers cannot probe for existence.
pub async fn resolve_business(ledger: &dyn LedgerStore, raw_id: &str) -> AppResult<BusinessId> {
    let business_id = BusinessId::new(parse_id(raw_id, "business_id")?);
    if !ledger.business_exists(business_id).await? {
        return Err(AppError::NotFound("Business not found.".to_string()));
    }
    Ok(business_id)
}
