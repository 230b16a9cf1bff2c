//! Reader flags on an article's subject categories.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::application::repos::{FlagsRepo, RepoError};
use crate::domain::flags::{FlagAction, FlagTarget};
use crate::domain::types::AuthId;

#[derive(Debug, Error)]
pub enum FlagError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct FlagService {
    flags: Arc<dyn FlagsRepo>,
}

impl FlagService {
    pub fn new(flags: Arc<dyn FlagsRepo>) -> Self {
        Self { flags }
    }

    /// Records a flag.
    ///
    /// A signed-in reader holds at most one flag per target and repeating it only refreshes
    /// the timestamp. Anonymous flags always add a row. An identity without a profile
    /// writes nothing.
    pub async fn flag(&self, target: FlagTarget, identity: Option<&AuthId>) -> Result<(), FlagError> {
        let rows = match identity {
            Some(auth_id) => self.flags.upsert_user_flag(target, auth_id).await?,
            None => self.flags.insert_anonymous_flag(target).await?,
        };
        log_outcome(FlagAction::Flag, target, identity, rows);
        Ok(())
    }

    /// Removes a flag.
    ///
    /// For a signed-in reader the matching row goes. Anonymously, one anonymous row for the
    /// target is removed if any exists.
    pub async fn deflag(
        &self,
        target: FlagTarget,
        identity: Option<&AuthId>,
    ) -> Result<(), FlagError> {
        let rows = match identity {
            Some(auth_id) => self.flags.delete_user_flag(target, auth_id).await?,
            None => self.flags.delete_one_anonymous_flag(target).await?,
        };
        log_outcome(FlagAction::Deflag, target, identity, rows);
        Ok(())
    }
}

fn log_outcome(action: FlagAction, target: FlagTarget, identity: Option<&AuthId>, rows: u64) {
    let anonymous = identity.is_none();
    if rows == 0 {
        debug!(
            target = "scholia::flags",
            action = action.as_str(),
            %target,
            anonymous,
            "flag change affected no rows"
        );
    } else {
        info!(
            target = "scholia::flags",
            action = action.as_str(),
            %target,
            anonymous,
            rows,
            "flag change applied"
        );
    }
}
