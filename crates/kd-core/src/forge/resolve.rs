use tracing::debug;

use super::{CommitId, ForgeApi, ForgeError, RepoCoordinate};

/// Resolve the coordinate's ref to an immutable commit.
///
/// Branch heads are looked up on every call. A "not found" answer means the ref is
/// taken to be a commit-like identifier already and is passed through unchanged; a
/// tag or an inaccessible repository takes the same path and fails later, at archive
/// download.
///
/// # Errors
///
/// Propagates every forge failure other than "not found".
pub fn resolve_commit(
    forge: &dyn ForgeApi,
    coordinate: &RepoCoordinate,
) -> Result<CommitId, ForgeError> {
    let RepoCoordinate {
        owner,
        repo,
        reference,
    } = coordinate;
    match forge.branch_head(owner, repo, reference) {
        Ok(sha) => {
            debug!(%owner, %repo, %reference, %sha, "resolved branch head");
            Ok(CommitId::new(sha))
        }
        Err(err) if err.is_not_found() => {
            debug!(%owner, %repo, %reference, "no such branch, using ref as commit");
            Ok(CommitId::new(reference.clone()))
        }
        Err(err) => Err(err),
    }
}
