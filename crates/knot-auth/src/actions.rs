//! Action and role name constants. The policy model treats these as plain
//! strings so the matcher stays data-driven; these constants exist only to
//! avoid typos at call sites.

pub const ROLE_SERVER_OWNER: &str = "server:owner";
pub const ROLE_SERVER_MEMBER: &str = "server:member";

pub const ACT_SERVER_INVITE: &str = "server:invite";
pub const ACT_REPO_CREATE: &str = "repo:create";
pub const ACT_REPO_PUSH: &str = "repo:push";
pub const ACT_REPO_SETTINGS: &str = "repo:settings";
pub const ACT_REPO_OWNER: &str = "repo:owner";
pub const ACT_REPO_INVITE: &str = "repo:invite";
pub const ACT_REPO_DELETE: &str = "repo:delete";
pub const ACT_REPO_COLLABORATOR: &str = "repo:collaborator";

/// The six object-scoped actions granted to a repo's creating member.
pub const REPO_OWNER_ACTIONS: [&str; 6] = [
    ACT_REPO_PUSH,
    ACT_REPO_SETTINGS,
    ACT_REPO_OWNER,
    ACT_REPO_INVITE,
    ACT_REPO_DELETE,
    ACT_REPO_COLLABORATOR,
];

/// The three actions granted to a repo collaborator.
pub const COLLABORATOR_ACTIONS: [&str; 3] = [ACT_REPO_COLLABORATOR, ACT_REPO_SETTINGS, ACT_REPO_PUSH];
