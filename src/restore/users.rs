//! User collection merge
//!
//! The users collection cannot be dropped. With drop enabled, the names of
//! existing users are captured before the file is restored. Restored users
//! that already exist replace them in place and leave the snapshot; whatever
//! is still in the snapshot afterwards is removed.

use super::RestoreSession;
use crate::connection::QueryOptions;
use crate::error::RestoreError;
use crate::types::Namespace;
use bson::doc;
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

/// Names of users present before a users file was restored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSnapshot {
    names: BTreeSet<String>,
}

impl UserSnapshot {
    pub fn capture<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Remove `name`, returning whether it was present
    pub fn take(&mut self, name: &str) -> bool {
        self.names.remove(name)
    }

    pub fn remaining(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }
}

impl RestoreSession<'_> {
    /// Record the names of users currently in `ns`
    pub(crate) fn snapshot_users(&mut self, ns: &Namespace) -> Result<(), RestoreError> {
        let existing = self
            .conn
            .query(ns, doc! {}, QueryOptions::projection(doc! { "user": 1 }))?;

        let mut names = Vec::with_capacity(existing.len());
        for user in existing {
            match user.get_str("user") {
                Ok(name) => names.push(name.to_string()),
                Err(_) => warn!(ns = %ns, "Skipping user record without a user name"),
            }
        }

        self.users = UserSnapshot::capture(names);
        info!(ns = %ns, users = self.users.len(), "Captured existing users; they will be merged instead of dropped");
        Ok(())
    }

    /// Remove users the dump did not contain. Server-side failures surface in
    /// the last-error check at the end of the walk.
    pub(crate) fn purge_stale_users(&mut self, ns: &Namespace) {
        let stale: Vec<String> = self.users.remaining().map(str::to_string).collect();
        for name in stale {
            debug!(ns = %ns, user = %name, "Removing user absent from dump");
            match self.conn.remove(ns, doc! { "user": name.as_str() }) {
                Ok(()) => self.report.users_removed += 1,
                Err(e) => {
                    error!(ns = %ns, user = %name, error = %e, "Error removing user from the database");
                }
            }
        }
        self.users.clear();
    }
}
