//! Repository handles backing logical replication restores.
//!
//! Every subscription gets a synthetic repository registered under a fixed
//! prefix; the restore service reads the publisher's snapshots through it.

/// Prefix of the synthetic repository registered per subscription.
pub const REMOTE_REPOSITORY_PREFIX: &str = "_logical_replication_";

/// Repository type tag understood by the repositories service.
pub const REPOSITORY_TYPE: &str = "logical_replication";

/// Snapshot tag addressing the publisher's most recent snapshot.
pub const LATEST_SNAPSHOT: &str = "_latest_";

/// External owner of repository handles. Registration is synchronous and
/// idempotent on the collaborator side.
pub trait RepositoriesService: Send + Sync {
    fn register_internal_repository(&self, name: &str, repository_type: &str);
    fn unregister_internal_repository(&self, name: &str);
}

/// Repository name for a subscription.
pub fn repository_name(subscription: &str) -> String {
    format!("{REMOTE_REPOSITORY_PREFIX}{subscription}")
}
