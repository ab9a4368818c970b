/// Internal keyserver records, stored in SQLite.
///
/// Records index the armored public key by fingerprint, user names and
/// emails; searches are paginated substring matches over those columns.
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, SignerError};
use crate::fingerprint::extract_identifier_fields;
use crate::keys::{fingerprints_from_key, read_public_keys};

/// A public key as served by the keyserver endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpgKeyRecord {
    #[serde(rename = "FullFingerPrint")]
    pub full_fingerprint: String,
    #[serde(rename = "Names")]
    pub names: Vec<String>,
    #[serde(rename = "Emails")]
    pub emails: Vec<String>,
    #[serde(rename = "KeyBits")]
    pub key_bits: i64,
    #[serde(rename = "Subkeys")]
    pub subkeys: Vec<String>,
    #[serde(rename = "AsciiArmoredPublicKey")]
    pub ascii_armored_public_key: String,
}

impl GpgKeyRecord {
    /// Parses an armored public key into a record.
    pub fn from_armored(armored: &str) -> Result<Self> {
        let key = read_public_keys(armored)?
            .into_iter()
            .next()
            .ok_or_else(|| SignerError::InvalidKeyMaterial("no key found".into()))?;

        use pgp::types::KeyTrait;
        let full_fingerprint = hex::encode_upper(key.fingerprint());

        let mut names = Vec::new();
        let mut emails = Vec::new();
        for user in &key.details.users {
            let id = String::from_utf8_lossy(user.id.id()).to_string();
            let (name, email) = extract_identifier_fields(&id);
            if !name.is_empty() {
                names.push(name);
            }
            if !email.is_empty() {
                emails.push(email);
            }
        }

        let key_bits = match key.primary_key.public_params() {
            pgp::types::PublicParams::RSA { n, .. } => (n.as_bytes().len() * 8) as i64,
            _ => 0,
        };

        let subkeys = fingerprints_from_key(armored)?
            .into_iter()
            .skip(1)
            .collect();

        Ok(Self {
            full_fingerprint,
            names,
            emails,
            key_bits,
            subkeys,
            ascii_armored_public_key: armored.to_string(),
        })
    }
}

#[derive(FromRow)]
struct KeyRow {
    full_fingerprint: String,
    names: String,
    emails: String,
    key_bits: i64,
    subkeys: String,
    ascii_armored_public_key: String,
}

impl KeyRow {
    fn into_record(self) -> GpgKeyRecord {
        GpgKeyRecord {
            full_fingerprint: self.full_fingerprint,
            names: serde_json::from_str(&self.names).unwrap_or_default(),
            emails: serde_json::from_str(&self.emails).unwrap_or_default(),
            key_bits: self.key_bits,
            subkeys: serde_json::from_str(&self.subkeys).unwrap_or_default(),
            ascii_armored_public_key: self.ascii_armored_public_key,
        }
    }
}

const SELECT_COLUMNS: &str = "full_fingerprint, names, emails, key_bits, subkeys, \
                              ascii_armored_public_key";

#[derive(Clone)]
pub struct KeyDatabase {
    pool: SqlitePool,
}

impl KeyDatabase {
    /// Opens the database and ensures the schema exists.
    pub async fn connect(url: &str) -> Result<Self> {
        // In-memory SQLite databases are per-connection; the pool must
        // stay at one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(db_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gpg_keys (
                id TEXT PRIMARY KEY,
                full_fingerprint TEXT NOT NULL UNIQUE,
                names TEXT NOT NULL,
                emails TEXT NOT NULL,
                key_bits INTEGER NOT NULL,
                subkeys TEXT NOT NULL,
                ascii_armored_public_key TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(db_error)?;

        Ok(Self { pool })
    }

    /// Inserts or replaces a record, keyed by the full fingerprint.
    pub async fn add(&self, record: &GpgKeyRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO gpg_keys (id, full_fingerprint, names, emails, key_bits, subkeys, ascii_armored_public_key)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(full_fingerprint) DO UPDATE SET
                names = excluded.names,
                emails = excluded.emails,
                key_bits = excluded.key_bits,
                subkeys = excluded.subkeys,
                ascii_armored_public_key = excluded.ascii_armored_public_key
            "#,
        )
        .bind(Uuid::now_v7().to_string())
        .bind(&record.full_fingerprint)
        .bind(serde_json::to_string(&record.names).unwrap_or_else(|_| "[]".into()))
        .bind(serde_json::to_string(&record.emails).unwrap_or_else(|_| "[]".into()))
        .bind(record.key_bits)
        .bind(serde_json::to_string(&record.subkeys).unwrap_or_else(|_| "[]".into()))
        .bind(&record.ascii_armored_public_key)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    /// Suffix match on the full fingerprint or any subkey fingerprint.
    pub async fn by_fingerprint(&self, fingerprint: &str) -> Result<Option<GpgKeyRecord>> {
        let fp = fingerprint.to_uppercase();
        let row: Option<KeyRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM gpg_keys \
             WHERE full_fingerprint LIKE ?1 OR subkeys LIKE ?2 LIMIT 1"
        ))
        .bind(format!("%{fp}"))
        .bind(format!("%{fp}%"))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(KeyRow::into_record))
    }

    pub async fn search_by_fingerprint(
        &self,
        fingerprint: &str,
        page_start: i64,
        page_end: i64,
    ) -> Result<Vec<GpgKeyRecord>> {
        self.search_column("full_fingerprint", fingerprint, page_start, page_end)
            .await
    }

    pub async fn search_by_name(
        &self,
        name: &str,
        page_start: i64,
        page_end: i64,
    ) -> Result<Vec<GpgKeyRecord>> {
        self.search_column("names", name, page_start, page_end).await
    }

    pub async fn search_by_email(
        &self,
        email: &str,
        page_start: i64,
        page_end: i64,
    ) -> Result<Vec<GpgKeyRecord>> {
        self.search_column("emails", email, page_start, page_end).await
    }

    /// Any-field match.
    pub async fn search(
        &self,
        value: &str,
        page_start: i64,
        page_end: i64,
    ) -> Result<Vec<GpgKeyRecord>> {
        let (limit, offset) = page_window(page_start, page_end);
        let rows: Vec<KeyRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM gpg_keys \
             WHERE full_fingerprint LIKE ?1 OR names LIKE ?1 OR emails LIKE ?1 \
             LIMIT ?2 OFFSET ?3"
        ))
        .bind(format!("%{value}%"))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(KeyRow::into_record).collect())
    }

    async fn search_column(
        &self,
        column: &str,
        value: &str,
        page_start: i64,
        page_end: i64,
    ) -> Result<Vec<GpgKeyRecord>> {
        let (limit, offset) = page_window(page_start, page_end);
        let rows: Vec<KeyRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM gpg_keys WHERE {column} LIKE ?1 LIMIT ?2 OFFSET ?3"
        ))
        .bind(format!("%{value}%"))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(KeyRow::into_record).collect())
    }

    /// Fills the subkey list of records stored before subkeys were tracked.
    /// A record whose armored key no longer parses is logged and removed.
    pub async fn backfill_subkeys(&self) -> Result<()> {
        let rows: Vec<KeyRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM gpg_keys WHERE subkeys = '[]' OR subkeys = ''"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        info!(count = rows.len(), "Backfilling subkey lists");

        for row in rows {
            let record = row.into_record();
            match fingerprints_from_key(&record.ascii_armored_public_key) {
                Ok(fps) => {
                    let subkeys: Vec<String> = fps.into_iter().skip(1).collect();
                    sqlx::query("UPDATE gpg_keys SET subkeys = ?1 WHERE full_fingerprint = ?2")
                        .bind(serde_json::to_string(&subkeys).unwrap_or_else(|_| "[]".into()))
                        .bind(&record.full_fingerprint)
                        .execute(&self.pool)
                        .await
                        .map_err(db_error)?;
                }
                Err(e) => {
                    warn!(
                        fingerprint = %record.full_fingerprint,
                        error = %e,
                        "Cannot read stored key, removing record"
                    );
                    sqlx::query("DELETE FROM gpg_keys WHERE full_fingerprint = ?1")
                        .bind(&record.full_fingerprint)
                        .execute(&self.pool)
                        .await
                        .map_err(db_error)?;
                }
            }
        }
        Ok(())
    }
}

fn page_window(page_start: i64, page_end: i64) -> (i64, i64) {
    let offset = page_start.max(0);
    let limit = (page_end - offset).max(0);
    (limit, offset)
}

fn db_error(e: sqlx::Error) -> SignerError {
    SignerError::Serialization(format!("database error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(0, 100), (100, 0));
        assert_eq!(page_window(10, 30), (20, 10));
        assert_eq!(page_window(50, 10), (0, 50));
        assert_eq!(page_window(-5, 10), (10, 0));
    }
}
