//! The RBAC decision engine built over [`knot_store::Store`].

mod actions;
mod enforcer;
mod error;

pub use actions::{
    ACT_REPO_COLLABORATOR, ACT_REPO_CREATE, ACT_REPO_DELETE, ACT_REPO_INVITE, ACT_REPO_OWNER,
    ACT_REPO_PUSH, ACT_REPO_SETTINGS, ACT_SERVER_INVITE, ROLE_SERVER_MEMBER, ROLE_SERVER_OWNER,
};
pub use enforcer::Enforcer;
pub use error::{AuthError, Result};
