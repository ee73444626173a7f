//! Customer and staff account storage.

use sqlx::PgPool;

use campus_eats_core::{CustomerId, Email};

use super::RepositoryError;
use crate::models::Customer;

const CUSTOMER_COLUMNS: &str = "id, email, name, phone_number, default_hostel, default_room, \
                                is_staff, loyalty_points, created_at";

/// Fields for a new account. The password must already be hashed.
#[derive(Debug, Clone)]
pub struct NewAccount<'a> {
    pub email: &'a Email,
    pub name: &'a str,
    pub phone_number: Option<&'a str>,
    pub password_hash: &'a str,
    pub is_staff: bool,
}

#[derive(sqlx::FromRow)]
struct CustomerWithHash {
    #[sqlx(flatten)]
    customer: Customer,
    password_hash: String,
}

/// Repository for account database operations.
pub struct AccountRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AccountRepository<'a> {
    /// Create a new account repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, account: &NewAccount<'_>) -> Result<Customer, RepositoryError> {
        let sql = format!(
            "INSERT INTO customer (email, name, phone_number, password_hash, is_staff)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {CUSTOMER_COLUMNS}"
        );

        sqlx::query_as::<_, Customer>(&sql)
            .bind(account.email)
            .bind(account.name)
            .bind(account.phone_number)
            .bind(account.password_hash)
            .bind(account.is_staff)
            .fetch_one(self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_unique_violation()
                {
                    return RepositoryError::Conflict("email already exists".to_owned());
                }
                RepositoryError::Database(e)
            })
    }

    /// Get an account by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customer WHERE id = $1");
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(customer)
    }

    /// Get an account and its password hash by email, for login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(Customer, String)>, RepositoryError> {
        let sql =
            format!("SELECT {CUSTOMER_COLUMNS}, password_hash FROM customer WHERE email = $1");
        let row = sqlx::query_as::<_, CustomerWithHash>(&sql)
            .bind(email)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(|r| (r.customer, r.password_hash)))
    }

    /// Update the default delivery address remembered for checkout.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the account does not exist.
    pub async fn set_default_address(
        &self,
        id: CustomerId,
        hostel: &str,
        room: &str,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE customer SET default_hostel = $2, default_room = $3 WHERE id = $1")
                .bind(id)
                .bind(hostel)
                .bind(room)
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
