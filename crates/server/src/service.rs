// crates/server/src/service.rs
//! Read side: serves cached global matrices and computes personal and
//! advanced queries on demand.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use dropstats_core::filter::{parse_id_filter, remove_closed_stages, retain_items, retain_stages};
use dropstats_core::{
    combine_element_lists, last_update_time, now_millis, ConfigKey, DropMatrixElement, MatrixEngine, MatrixKind,
    MatrixQuery, MatrixResult, MatrixStore, Server,
};

/// One drop-matrix request as the serving layer receives it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixRequest {
    pub server: Server,
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_personal: bool,
    #[serde(default)]
    pub show_closed_zones: bool,
    /// Comma-separated stage ids.
    pub stage_filter: Option<String>,
    /// Comma-separated item ids.
    pub item_filter: Option<String>,
}

impl MatrixRequest {
    /// Global matrix of `server`, open stages only, unfiltered.
    pub fn new(server: Server) -> Self {
        Self {
            server,
            user_id: None,
            is_personal: false,
            show_closed_zones: false,
            stage_filter: None,
            item_filter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixResponse {
    pub elements: Vec<DropMatrixElement>,
    /// Latest update time of the served global data. Unset for personal data.
    pub last_modified: Option<i64>,
}

/// One entry of an advanced batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedQuery {
    #[serde(flatten)]
    pub query: MatrixQuery,
    #[serde(default)]
    pub is_personal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedResult {
    /// Position of the query in the request.
    pub index: usize,
    pub elements: Vec<DropMatrixElement>,
}

#[derive(Clone)]
pub struct MatrixService {
    engine: MatrixEngine,
    store: Arc<dyn MatrixStore>,
    retry_delay: Duration,
    default_timeout: Duration,
}

impl MatrixService {
    pub fn new(
        engine: MatrixEngine,
        store: Arc<dyn MatrixStore>,
        retry_delay: Duration,
        default_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            retry_delay,
            default_timeout,
        }
    }

    pub fn engine(&self) -> &MatrixEngine {
        &self.engine
    }

    /// Read a cache slot, retrying once when it is empty.
    ///
    /// An empty slot usually means a refresh is replacing it. Still empty
    /// after the retry is logged and served as is.
    async fn load_with_retry(&self, kind: MatrixKind, server: Server, is_past: bool) -> MatrixResult<Vec<DropMatrixElement>> {
        let rows = self.store.load(kind, server, is_past).await?;
        if !rows.is_empty() {
            return Ok(rows);
        }
        debug!(server = %server, kind = kind.as_str(), is_past, "Matrix cache empty, retrying");
        tokio::time::sleep(self.retry_delay).await;
        let rows = self.store.load(kind, server, is_past).await?;
        if rows.is_empty() {
            error!(server = %server, kind = kind.as_str(), is_past, "Matrix cache still empty after retry");
        }
        Ok(rows)
    }

    pub async fn global_matrix(&self, server: Server, is_past: bool) -> MatrixResult<Vec<DropMatrixElement>> {
        self.load_with_retry(MatrixKind::Regular, server, is_past).await
    }

    /// Past or current matrix of one user, computed now.
    pub async fn personal_matrix(&self, server: Server, user_id: &str, is_past: bool) -> MatrixResult<Vec<DropMatrixElement>> {
        let key = if is_past {
            ConfigKey::PastGlobalMatrixQueryTimeout
        } else {
            ConfigKey::CurrentGlobalMatrixQueryTimeout
        };
        let timeout = self.engine.timeout_for(key).await.unwrap_or(self.default_timeout);
        let query = MatrixQuery::GlobalMatrix {
            server,
            user_id: Some(user_id.to_string()),
            is_past,
        };
        self.engine.execute(&query, Some(timeout)).await
    }

    /// Past and current statistics combined, then filtered.
    pub async fn matrix(&self, request: &MatrixRequest) -> MatrixResult<MatrixResponse> {
        let server = request.server;
        let (past, current) = match (request.is_personal, request.user_id.as_deref()) {
            (true, Some(user_id)) => (
                self.personal_matrix(server, user_id, true).await?,
                self.personal_matrix(server, user_id, false).await?,
            ),
            (true, None) => {
                debug!(server = %server, "Personal matrix requested without a user");
                return Ok(MatrixResponse {
                    elements: Vec::new(),
                    last_modified: None,
                });
            }
            (false, _) => (self.global_matrix(server, true).await?, self.global_matrix(server, false).await?),
        };

        let mut elements = combine_element_lists(past, current);
        if !request.show_closed_zones {
            let open = self.engine.drop_info().opening_stages(server, now_millis()).await?;
            remove_closed_stages(&mut elements, &open);
        }
        if let Some(raw) = &request.stage_filter {
            retain_stages(&mut elements, &parse_id_filter(raw));
        }
        if let Some(raw) = &request.item_filter {
            retain_items(&mut elements, &parse_id_filter(raw));
        }

        let last_modified = if request.is_personal {
            None
        } else {
            last_update_time(&elements)
        };
        Ok(MatrixResponse {
            elements,
            last_modified,
        })
    }

    /// Cached global trend of `server`, stamped with its latest update.
    pub async fn trends(&self, server: Server) -> MatrixResult<MatrixResponse> {
        let elements = self.load_with_retry(MatrixKind::Segmented, server, false).await?;
        let last_modified = last_update_time(&elements);
        Ok(MatrixResponse {
            elements,
            last_modified,
        })
    }

    /// Run a batch of queries. Personal entries are bound to `user_id`; with
    /// no user they run over every upload. Failed entries are left out.
    pub async fn advanced(&self, queries: &[AdvancedQuery], user_id: Option<&str>) -> MatrixResult<Vec<AdvancedResult>> {
        let bound: Vec<MatrixQuery> = queries
            .iter()
            .enumerate()
            .map(|(index, entry)| match (entry.is_personal, user_id) {
                (true, Some(user)) => entry.query.clone().with_user(user),
                (true, None) => {
                    debug!(index, "Personal advanced query without a user, running unrestricted");
                    entry.query.clone()
                }
                (false, _) => entry.query.clone(),
            })
            .collect();

        let results = self.engine.execute_advanced(&bound, self.default_timeout).await?;
        Ok(results
            .into_iter()
            .map(|(index, elements)| AdvancedResult { index, elements })
            .collect())
    }
}
