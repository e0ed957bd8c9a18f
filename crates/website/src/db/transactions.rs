//! Transaction ledger repository.

use sqlx::PgPool;

use super::RepositoryError;
use crate::models::NewTransaction;

/// Repository for the transaction ledger.
pub struct TransactionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TransactionRepository<'a> {
    /// Create a new transaction repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a transaction.
    ///
    /// Returns `false` when the processor re-delivered a transaction that is
    /// already logged for this item.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn log(&self, transaction: &NewTransaction) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO transactions (
                product_id, amount_gross, amount_net, currency, settle_amount,
                settle_currency, identifier, payment_processor, customer_email,
                metadata, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (identifier, product_id) DO NOTHING
            ",
        )
        .bind(transaction.product_id)
        .bind(transaction.amount_gross)
        .bind(transaction.amount_net)
        .bind(&transaction.currency)
        .bind(transaction.settle_amount)
        .bind(&transaction.settle_currency)
        .bind(&transaction.identifier)
        .bind(transaction.payment_processor.as_str())
        .bind(transaction.customer_email.as_deref())
        .bind(&transaction.metadata)
        .bind(transaction.timestamp)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
