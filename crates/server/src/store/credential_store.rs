// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! API Credential storage (spec §3). Tokens are opaque, carry a
//! recognizable prefix, and are stored only as a SHA-256 hash — the same
//! "never persist the secret, only its hash" shape as device secrets in
//! `device_store`.

use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use super::StoreError;

const TOKEN_PREFIX: &str = "lbk_";

pub struct CredentialStore {
    pool: SqlitePool,
}

/// A freshly minted token, returned exactly once.
pub struct IssuedToken {
    pub token: String,
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

impl CredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Mint and persist a new API credential. Returns the plaintext token
    /// once; only its hash is ever stored.
    pub async fn create(&self, created_by: &str) -> Result<IssuedToken, StoreError> {
        let mut raw = [0u8; 24];
        rand::rng().fill_bytes(&mut raw);
        let token = format!("{TOKEN_PREFIX}{}", base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw));
        let hash = hash_token(&token);
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO api_credentials (token_hash, prefix, created_by, created_at, last_used_at, active) VALUES (?, ?, ?, ?, NULL, 1)",
        )
        .bind(&hash)
        .bind(TOKEN_PREFIX)
        .bind(created_by)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(IssuedToken { token })
    }

    /// Validate a bearer token: active, known, and touches `last_used_at`.
    pub async fn authenticate(&self, token: &str) -> Result<bool, StoreError> {
        if !token.starts_with(TOKEN_PREFIX) {
            return Ok(false);
        }
        let hash = hash_token(token);
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT active FROM api_credentials WHERE token_hash = ?")
                .bind(&hash)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((true,)) => {
                sqlx::query("UPDATE api_credentials SET last_used_at = ? WHERE token_hash = ?")
                    .bind(Utc::now().to_rfc3339())
                    .bind(&hash)
                    .execute(&self.pool)
                    .await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Immediate revocation — distinct from deletion (spec §3).
    pub async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        let hash = hash_token(token);
        sqlx::query("UPDATE api_credentials SET active = 0 WHERE token_hash = ?")
            .bind(&hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_authenticate() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::connect_pool_for_test(&pool).await;
        let store = CredentialStore::new(pool);

        let issued = store.create("operator").await.unwrap();
        assert!(issued.token.starts_with(TOKEN_PREFIX));
        assert!(store.authenticate(&issued.token).await.unwrap());
        assert!(!store.authenticate("lbk_garbage").await.unwrap());

        store.revoke(&issued.token).await.unwrap();
        assert!(!store.authenticate(&issued.token).await.unwrap());
    }
}
