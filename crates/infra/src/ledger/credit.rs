use tracing::{debug, instrument};

use dualmart_accounts::CreditCharge;
use dualmart_core::{AccountId, Money};

use super::LedgerError;
use crate::store::AccountStore;

/// Charge `amount` against a wholesale account's credit line.
///
/// On any error the account document is not written.
#[instrument(skip(tx, amount), fields(amount = %amount), err)]
pub async fn charge_credit<T>(
    tx: &mut T,
    account_id: AccountId,
    amount: Money,
) -> Result<CreditCharge, LedgerError>
where
    T: AccountStore + ?Sized,
{
    let mut account = tx
        .load_account(account_id)
        .await?
        .ok_or(LedgerError::AccountNotFound(account_id))?;

    let charge = account
        .charge_credit(amount)
        .map_err(|source| LedgerError::Credit { account_id, source })?;

    tx.save_account(&account).await?;

    debug!(credit_used = %charge.credit_used, remaining = ?charge.remaining, "credit charged");
    Ok(charge)
}
