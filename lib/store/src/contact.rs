//! Postgres repository for contacts.

use crate::flow::into_store_error;
use async_trait::async_trait;
use chatflow_core::{AccountId, ContactId};
use chatflow_engine::{Contact, ContactStore, StoreError};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for contact queries.
#[derive(FromRow)]
struct ContactRow {
    id: String,
    account_id: String,
    platform_user_id: String,
    name: Option<String>,
    email: Option<String>,
    tags: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ContactRow {
    fn try_into_contact(self) -> Result<Contact, sqlx::Error> {
        let id = ContactId::from_str(&self.id).map_err(|e| {
            sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid contact id '{}': {}", self.id, e),
            )))
        })?;
        let account_id = AccountId::from_str(&self.account_id).map_err(|e| {
            sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid account id '{}': {}", self.account_id, e),
            )))
        })?;

        let tags: Vec<String> = serde_json::from_value(self.tags).unwrap_or_default();

        Ok(Contact {
            id,
            account_id,
            platform_user_id: self.platform_user_id,
            name: self.name,
            email: self.email,
            tags,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Repository for contact operations.
pub struct ContactRepository {
    pool: PgPool,
}

impl ContactRepository {
    /// Creates a new repository.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds a contact by account and platform user id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or row decoding fails.
    pub async fn find(
        &self,
        account_id: AccountId,
        platform_user_id: &str,
    ) -> Result<Option<Contact>, sqlx::Error> {
        let row: Option<ContactRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, platform_user_id, name, email, tags, created_at, updated_at
            FROM contacts
            WHERE account_id = $1 AND platform_user_id = $2
            "#,
        )
        .bind(account_id.to_string())
        .bind(platform_user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(r.try_into_contact()?)),
            None => Ok(None),
        }
    }

    /// Creates a new contact.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, including when the
    /// (account_id, platform_user_id) pair already exists.
    pub async fn create(&self, contact: &Contact) -> Result<(), sqlx::Error> {
        let tags_json = serde_json::to_value(&contact.tags).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO contacts
                (id, account_id, platform_user_id, name, email, tags, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(contact.id.to_string())
        .bind(contact.account_id.to_string())
        .bind(&contact.platform_user_id)
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&tags_json)
        .bind(contact.created_at)
        .bind(contact.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Appends a tag to a contact's tag array.
    ///
    /// Idempotent: the containment guard makes re-adding an existing tag a
    /// no-op, atomically, even under concurrent chains.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn append_tag(&self, contact_id: ContactId, tag: &str) -> Result<(), sqlx::Error> {
        let tag_json = serde_json::json!([tag]);

        sqlx::query(
            r#"
            UPDATE contacts
            SET tags = tags || $2, updated_at = NOW()
            WHERE id = $1 AND NOT tags @> $2
            "#,
        )
        .bind(contact_id.to_string())
        .bind(&tag_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a collected email address.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_email(&self, contact_id: ContactId, email: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE contacts SET email = $2, updated_at = NOW() WHERE id = $1")
            .bind(contact_id.to_string())
            .bind(email)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ContactStore for ContactRepository {
    async fn find_by_platform_user(
        &self,
        account_id: AccountId,
        platform_user_id: &str,
    ) -> Result<Option<Contact>, StoreError> {
        self.find(account_id, platform_user_id)
            .await
            .map_err(into_store_error)
    }

    async fn add_tag(&self, contact_id: ContactId, tag: &str) -> Result<(), StoreError> {
        self.append_tag(contact_id, tag)
            .await
            .map_err(into_store_error)
    }
}
