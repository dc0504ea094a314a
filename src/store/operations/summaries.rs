use crate::aggregator::UserSummary;
use crate::constants::MAX_CAS_RETRIES;
use crate::store::keys;
use crate::store::{Store, StoreError};

impl Store {
    /// Unreadable bytes are logged and treated as absent, so the next merge
    /// recomputes the user from scratch.
    pub fn load_summary(&self, user_id: u64) -> Result<Option<UserSummary>, StoreError> {
        let key = keys::summary_key(user_id);
        match self.summaries.get(key.as_bytes())? {
            Some(raw) => Ok(decode_summary(user_id, &raw)),
            None => Ok(None),
        }
    }

    /// Overwrites the stored record entirely.
    pub fn save_summary(&self, summary: &UserSummary) -> Result<(), StoreError> {
        let key = keys::summary_key(summary.user_id);
        self.summaries
            .insert(key.as_bytes(), Self::serialize(summary)?)?;
        self.index_username(summary)?;
        Ok(())
    }

    /// Writes `summary` only if the stored watermark still equals `expected`.
    ///
    /// Returns `Conflict` when another writer merged into this user after the
    /// caller loaded its prior state.
    pub fn save_summary_if_watermark(
        &self,
        summary: &UserSummary,
        expected: Option<u64>,
    ) -> Result<(), StoreError> {
        let key = keys::summary_key(summary.user_id);
        let new_bytes = Self::serialize(summary)?;

        for _ in 0..MAX_CAS_RETRIES {
            let current = self.summaries.get(key.as_bytes())?;
            let current_watermark = current
                .as_deref()
                .and_then(|raw| Self::deserialize::<UserSummary>(raw).ok())
                .map(|stored| stored.last_changeset_id);

            if current_watermark != expected {
                return Err(StoreError::Conflict {
                    entity: "summary".to_string(),
                    key,
                });
            }

            let cas = self.summaries.compare_and_swap(
                key.as_bytes(),
                current.as_deref(),
                Some(new_bytes.clone()),
            )?;
            if cas.is_ok() {
                self.index_username(summary)?;
                return Ok(());
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "summary".to_string(),
            key,
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// The lowest user id owns a normalized name, whatever order the
    /// summaries are saved in.
    fn index_username(&self, summary: &UserSummary) -> Result<(), StoreError> {
        let Some(username) = summary.username.as_deref() else {
            return Ok(());
        };
        let index_key = keys::username_index_key(username);
        if index_key.is_empty() {
            return Ok(());
        }
        let new_value = summary.user_id.to_string().into_bytes();

        for _ in 0..MAX_CAS_RETRIES {
            let current = self.username_index.get(index_key.as_bytes())?;
            let owner = current.as_deref().and_then(keys::parse_summary_key);
            if owner.is_some_and(|owner| owner <= summary.user_id) {
                return Ok(());
            }

            let cas = self.username_index.compare_and_swap(
                index_key.as_bytes(),
                current.as_deref(),
                Some(new_value.clone()),
            )?;
            if cas.is_ok() {
                return Ok(());
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "username_index".to_string(),
            key: index_key,
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// Resolves a username (trimmed, case-insensitive) to a user id.
    ///
    /// Consults the index first and falls back to scanning summaries, which
    /// covers records written before the index existed.
    pub fn find_by_username(&self, username: &str) -> Result<Option<u64>, StoreError> {
        let needle = keys::normalize_username(username);
        if needle.is_empty() {
            return Ok(None);
        }

        if let Some(raw) = self.username_index.get(needle.as_bytes())? {
            match keys::parse_summary_key(&raw) {
                Some(user_id) => return Ok(Some(user_id)),
                None => tracing::warn!(username = %needle, "Invalid user id in username index"),
            }
        }

        for item in self.summaries.iter() {
            let (key, value) = item?;
            let Some(user_id) = keys::parse_summary_key(&key) else {
                continue;
            };
            let Some(summary) = decode_summary(user_id, &value) else {
                continue;
            };
            let matches = summary
                .username
                .as_deref()
                .is_some_and(|name| keys::normalize_username(name) == needle);
            if matches {
                return Ok(Some(user_id));
            }
        }

        Ok(None)
    }

    /// One page of summaries in user id order.
    ///
    /// Offsets count stored rows, matching [`Store::count_summaries`]. An
    /// unreadable row keeps its slot and is left out of the page.
    pub fn list_summaries(&self, limit: usize, offset: usize) -> Result<Vec<UserSummary>, StoreError> {
        let mut summaries = Vec::with_capacity(limit.min(1024));
        for item in self.summaries.iter().skip(offset).take(limit) {
            let (key, value) = item?;
            let Some(user_id) = keys::parse_summary_key(&key) else {
                continue;
            };
            if let Some(summary) = decode_summary(user_id, &value) {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }

    /// Stored rows, including any that no longer decode.
    pub fn count_summaries(&self) -> usize {
        self.summaries.len()
    }

    pub(crate) fn reindex_usernames(&self) -> Result<usize, StoreError> {
        let mut indexed = 0usize;
        for item in self.summaries.iter() {
            let (key, value) = item?;
            let Some(user_id) = keys::parse_summary_key(&key) else {
                continue;
            };
            if let Some(summary) = decode_summary(user_id, &value) {
                self.index_username(&summary)?;
                indexed += 1;
            }
        }
        Ok(indexed)
    }
}

fn decode_summary(user_id: u64, raw: &[u8]) -> Option<UserSummary> {
    match Store::deserialize::<UserSummary>(raw) {
        Ok(summary) => Some(summary),
        Err(e) => {
            tracing::warn!(user_id, error = %e, "Stored summary is unreadable, treating as absent");
            None
        }
    }
}
