//! Parses `SSH_ORIGINAL_COMMAND` into the git service it names plus the
//! `<user>/<repo>` identifier it targets.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("no SSH_ORIGINAL_COMMAND was set")]
    Missing,
    #[error("unrecognised git service in command: {0}")]
    UnknownService(String),
    #[error("malformed command, expected '<service> <user>/<repo>': {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitService {
    UploadPack,
    ReceivePack,
    UploadArchive,
}

impl GitService {
    pub fn as_str(self) -> &'static str {
        match self {
            GitService::UploadPack => "git-upload-pack",
            GitService::ReceivePack => "git-receive-pack",
            GitService::UploadArchive => "git-upload-archive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub service: GitService,
    pub user: String,
    pub repo: String,
}

/// Parses a forced command of the shape `<service> '<user>/<repo>'`
/// (git clients quote the path; the quotes, if present, are stripped).
pub fn parse(raw: &str) -> Result<ParsedCommand, CommandError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CommandError::Missing);
    }
    let mut parts = raw.splitn(2, char::is_whitespace);
    let service_str = parts.next().ok_or_else(|| CommandError::Malformed(raw.to_string()))?;
    let path_arg = parts
        .next()
        .ok_or_else(|| CommandError::Malformed(raw.to_string()))?
        .trim()
        .trim_matches('\'')
        .trim_matches('"');

    let service = match service_str {
        "git-upload-pack" => GitService::UploadPack,
        "git-receive-pack" => GitService::ReceivePack,
        "git-upload-archive" => GitService::UploadArchive,
        other => return Err(CommandError::UnknownService(other.to_string())),
    };

    let (user, repo) = path_arg
        .split_once('/')
        .ok_or_else(|| CommandError::Malformed(raw.to_string()))?;
    if user.is_empty() || repo.is_empty() {
        return Err(CommandError::Malformed(raw.to_string()));
    }

    Ok(ParsedCommand {
        service,
        user: user.to_string(),
        repo: repo.trim_end_matches(".git").to_string(),
    })
}
