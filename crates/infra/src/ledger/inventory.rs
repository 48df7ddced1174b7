use tracing::{debug, instrument, warn};

use dualmart_core::ProductId;
use dualmart_inventory::Reservation;

use super::LedgerError;
use crate::store::CatalogStore;

/// Reserve `quantity` of a product (and of `size`, when the product tracks sizes).
///
/// On any error the product document is not written.
#[instrument(skip(tx), err)]
pub async fn reserve_stock<T>(
    tx: &mut T,
    product_id: ProductId,
    size: Option<&str>,
    quantity: u32,
) -> Result<Reservation, LedgerError>
where
    T: CatalogStore + ?Sized,
{
    let mut product = tx
        .load_product(product_id)
        .await?
        .ok_or(LedgerError::ProductNotFound(product_id))?;

    if let Some(drift) = product.size_stock_drift() {
        warn!(
            product_id = %product_id,
            sized_total = drift.sized_total,
            on_hand = drift.on_hand,
            "per-size stock exceeds aggregate stock"
        );
    }

    let reservation = product
        .reserve(size, quantity)
        .map_err(|source| LedgerError::Stock { product_id, source })?;

    tx.save_product(&product).await?;

    debug!(
        remaining_on_hand = reservation.remaining_on_hand,
        remaining_for_size = ?reservation.remaining_for_size,
        "stock reserved"
    );
    Ok(reservation)
}
