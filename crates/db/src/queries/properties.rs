//! Runtime tunables stored as key/value system properties.

use async_trait::async_trait;
use dropstats_core::{ConfigKey, ConfigProvider};
use tracing::warn;

use crate::{Database, DbError, DbResult};

impl Database {
    /// Insert or overwrite a property.
    pub async fn set_system_property(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO system_properties (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_system_property(&self, key: &str) -> DbResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM system_properties WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|(value,)| value))
    }

    /// Integer property; a non-integer value is reported as malformed.
    pub async fn get_system_property_i64(&self, key: &str) -> DbResult<Option<i64>> {
        match self.get_system_property(key).await? {
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| DbError::Malformed(format!("system property {key} = {value:?}"))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ConfigProvider for Database {
    async fn get_i64(&self, key: ConfigKey) -> Option<i64> {
        match self.get_system_property_i64(key.as_str()).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "Failed to read system property");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_overwrite() {
        let db = Database::new_in_memory().await.unwrap();
        assert_eq!(db.get_system_property("maxSectionNum").await.unwrap(), None);

        db.set_system_property("maxSectionNum", "100").await.unwrap();
        db.set_system_property("maxSectionNum", "120").await.unwrap();
        assert_eq!(db.get_i64(ConfigKey::MaxSectionNum).await, Some(120));
    }

    #[tokio::test]
    async fn test_malformed_value_reads_as_missing() {
        let db = Database::new_in_memory().await.unwrap();
        db.set_system_property("advancedQueryTimeout", "soon").await.unwrap();
        assert!(matches!(
            db.get_system_property_i64("advancedQueryTimeout").await,
            Err(DbError::Malformed(_))
        ));
        assert_eq!(db.get_i64(ConfigKey::AdvancedQueryTimeout).await, None);
    }
}
