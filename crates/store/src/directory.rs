/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Organization, domain and user records.

use crate::model::{Domain, NamespaceMode, Organization, User};
use crate::{now, Result, Store, StoreError};

impl Store {
    pub async fn create_organization(&self, name: &str) -> Result<Organization> {
        let created_at = now();
        let id = sqlx::query("INSERT INTO organizations (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(created_at)
            .execute(self.pool())
            .await?
            .last_insert_rowid();

        Ok(Organization {
            id,
            name: name.to_string(),
            created_at,
        })
    }

    pub async fn create_domain(&self, org_id: i64, name: &str) -> Result<Domain> {
        let created_at = now();
        let result = sqlx::query("INSERT INTO domains (org_id, name, created_at) VALUES (?, ?, ?)")
            .bind(org_id)
            .bind(name)
            .bind(created_at)
            .execute(self.pool())
            .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(err) => {
                let err = StoreError::from(err);
                if err.is_unique_violation() {
                    return Err(StoreError::AlreadyExists(name.to_string()));
                }
                return Err(err);
            }
        };

        Ok(Domain {
            id,
            org_id,
            name: name.to_string(),
            created_at,
        })
    }

    pub async fn domain_by_name(&self, name: &str) -> Result<Option<Domain>> {
        Ok(sqlx::query_as("SELECT * FROM domains WHERE name = ?")
            .bind(name)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn domain_by_id(&self, id: i64) -> Result<Option<Domain>> {
        Ok(sqlx::query_as("SELECT * FROM domains WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn list_domains(&self) -> Result<Vec<Domain>> {
        Ok(sqlx::query_as("SELECT * FROM domains ORDER BY name")
            .fetch_all(self.pool())
            .await?)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_user(
        &self,
        primary_email: &str,
        display_name: &str,
        password_salt: &str,
        password_hash: &str,
        primary_domain_id: i64,
        active: bool,
    ) -> Result<User> {
        let created_at = now();
        let mode = NamespaceMode::DomainSeparated;
        let id = sqlx::query(
            "INSERT INTO users (primary_email, display_name, password_salt, password_hash, \
             primary_domain_id, namespace_mode, active, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(primary_email)
        .bind(display_name)
        .bind(password_salt)
        .bind(password_hash)
        .bind(primary_domain_id)
        .bind(mode.as_str())
        .bind(active)
        .bind(created_at)
        .execute(self.pool())
        .await?
        .last_insert_rowid();

        Ok(User {
            id,
            primary_email: primary_email.to_string(),
            display_name: display_name.to_string(),
            password_salt: password_salt.to_string(),
            password_hash: password_hash.to_string(),
            primary_domain_id,
            namespace_mode: mode,
            active,
            created_at,
        })
    }

    pub async fn user_by_primary_email(&self, email: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE primary_email = ?")
            .bind(email)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn user_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn set_namespace_mode(&self, user_id: i64, mode: NamespaceMode) -> Result<()> {
        sqlx::query("UPDATE users SET namespace_mode = ? WHERE id = ?")
            .bind(mode.as_str())
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_user_active(&self, user_id: i64, active: bool) -> Result<()> {
        sqlx::query("UPDATE users SET active = ? WHERE id = ?")
            .bind(active)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{NamespaceMode, Store, StoreError};

    #[tokio::test]
    async fn duplicate_domain_is_rejected() {
        let store = Store::open_memory().await.unwrap();
        let org = store.create_organization("acme").await.unwrap();
        store.create_domain(org.id, "a.com").await.unwrap();

        match store.create_domain(org.id, "a.com").await {
            Err(StoreError::AlreadyExists(name)) => assert_eq!(name, "a.com"),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn namespace_mode_round_trips() {
        let store = Store::open_memory().await.unwrap();
        let org = store.create_organization("acme").await.unwrap();
        let domain = store.create_domain(org.id, "a.com").await.unwrap();
        let user = store
            .create_user("alice@a.com", "Alice", "salt", "hash", domain.id, true)
            .await
            .unwrap();
        assert_eq!(user.namespace_mode, NamespaceMode::DomainSeparated);

        store
            .set_namespace_mode(user.id, NamespaceMode::Unified)
            .await
            .unwrap();
        let reloaded = store.user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.namespace_mode, NamespaceMode::Unified);
    }
}
