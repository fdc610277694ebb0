pub mod balance;
pub mod calendar;
pub mod jobs;
pub mod late_fees;
pub mod notifications;
pub mod overdue;
pub mod policy;
pub mod reminders;
pub mod reports;
pub mod scheduler;

#[cfg(test)]
pub mod testing;

use std::collections::HashMap;

use uuid::Uuid;

use crate::{error::AppResult, repository::LedgerStore, tenancy::BusinessId};

/// Property titles by id, used to label payments in reports and notices.
pub(crate) async fn property_titles(
    ledger: &dyn LedgerStore,
    business: BusinessId,
) -> AppResult<HashMap<Uuid, String>> {
    Ok(ledger
        .list_properties(business)
        .await?
        .into_iter()
        .map(|property| (property.id, property.title))
        .collect())
}
