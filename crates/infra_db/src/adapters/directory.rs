//! PostgreSQL Directory
//!
//! Client and payer lookups backed by the `clients` and `payers` tables.
//! The registration helpers exist for seeding and tests; the engine itself
//! only reads.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use uuid::Uuid;

use core_kernel::{ClientId, DomainPort, PayerId, PortError};
use domain_revenue::{DirectoryEntry, DirectoryPort, PartyStatus};

use crate::error::DatabaseError;

#[derive(Debug, Clone, FromRow)]
struct PartyRow {
    id: Uuid,
    name: String,
    status: String,
}

impl TryFrom<PartyRow> for DirectoryEntry {
    type Error = DatabaseError;

    fn try_from(row: PartyRow) -> Result<Self, Self::Error> {
        let status = PartyStatus::parse(&row.status)
            .ok_or_else(|| DatabaseError::invalid("status", &row.status))?;
        Ok(DirectoryEntry {
            id: row.id,
            name: row.name,
            status,
        })
    }
}

/// PostgreSQL-backed implementation of `DirectoryPort`
#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: PgPool,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or updates a client
    pub async fn register_client(
        &self,
        id: ClientId,
        name: &str,
        status: PartyStatus,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO clients (client_id, name, status) VALUES ($1, $2, $3)
            ON CONFLICT (client_id) DO UPDATE SET name = EXCLUDED.name, status = EXCLUDED.status
            "#,
        )
        .bind(*id.as_uuid())
        .bind(name)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts or updates a payer
    pub async fn register_payer(
        &self,
        id: PayerId,
        name: &str,
        status: PartyStatus,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO payers (payer_id, name, status) VALUES ($1, $2, $3)
            ON CONFLICT (payer_id) DO UPDATE SET name = EXCLUDED.name, status = EXCLUDED.status
            "#,
        )
        .bind(*id.as_uuid())
        .bind(name)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(
        &self,
        sql: &str,
        entity: &'static str,
        id: Uuid,
    ) -> Result<DirectoryEntry, DatabaseError> {
        let row = sqlx::query_as::<_, PartyRow>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found(entity, id))?;
        DirectoryEntry::try_from(row)
    }
}

impl DomainPort for PostgresDirectory {}

#[async_trait]
impl DirectoryPort for PostgresDirectory {
    #[instrument(skip(self), fields(client_id = %id))]
    async fn get_client(&self, id: ClientId) -> Result<DirectoryEntry, PortError> {
        let entry = self
            .fetch(
                "SELECT client_id AS id, name, status FROM clients WHERE client_id = $1",
                "Client",
                *id.as_uuid(),
            )
            .await?;
        Ok(entry)
    }

    #[instrument(skip(self), fields(payer_id = %id))]
    async fn get_payer(&self, id: PayerId) -> Result<DirectoryEntry, PortError> {
        let entry = self
            .fetch(
                "SELECT payer_id AS id, name, status FROM payers WHERE payer_id = $1",
                "Payer",
                *id.as_uuid(),
            )
            .await?;
        Ok(entry)
    }
}
