use std::time::Duration;

use async_trait::async_trait;

use super::xml::parse_changesets;
use super::{ChangesetSource, FetchOutcome, SourceError};
use crate::config::SourceConfig;

#[derive(Debug, Clone)]
pub struct HttpChangesetSource {
    config: SourceConfig,
    client: reqwest::Client,
}

impl HttpChangesetSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(config.max_connections)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;
        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    pub fn changesets_url(&self, user_id: u64) -> String {
        format!(
            "{}/api/0.6/changesets?user={}",
            self.config.base_url.trim_end_matches('/'),
            user_id
        )
    }

    fn map_transport_error(&self, err: reqwest::Error) -> SourceError {
        if err.is_timeout() {
            SourceError::Timeout {
                secs: self.config.timeout_secs,
            }
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl ChangesetSource for HttpChangesetSource {
    async fn fetch(
        &self,
        user_id: u64,
        since_id: Option<u64>,
    ) -> Result<FetchOutcome, SourceError> {
        let url = self.changesets_url(user_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(user_id, status = status.as_u16(), "Changeset api returned non-success");
            return Err(SourceError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let batch = parse_changesets(&body).map_err(|e| SourceError::Decode(e.to_string()))?;

        for malformed in &batch.malformed {
            tracing::warn!(user_id, error = %malformed, "Dropping malformed changeset");
        }

        let watermark = since_id.unwrap_or(0);
        let records = batch
            .records
            .into_iter()
            .filter(|record| record.id > watermark)
            .collect();

        Ok(FetchOutcome::from_records(records))
    }
}
