//! `knot-guard` -- the forced command behind every entry in the knot's
//! `authorized_keys` file. sshd invokes this once per connection with
//! `SSH_ORIGINAL_COMMAND` set to whatever the git client asked for; this
//! binary decides whether that's allowed and, if so, becomes the
//! underlying git service via `exec`.

mod command;
mod identity;
mod motd;

use std::process::ExitCode;

use clap::Parser;

use command::GitService;

/// Forced-command entry point, one instance launched per SSH connection.
#[derive(Parser, Debug)]
#[command(name = "knot-guard")]
struct Args {
    /// Root directory bare repos are scanned from; the git-dir for a
    /// request is securely joined against this.
    #[arg(long)]
    git_dir: std::path::PathBuf,

    /// The DID this SSH key is bound to, fixed per `authorized_keys` line.
    #[arg(long)]
    user: String,

    /// Loopback base URL of the knot's internal HTTP API.
    #[arg(long)]
    internal_api: String,

    /// Appview base URL, used to resolve a handle to a DID when the
    /// command names the target repo owner by handle rather than DID.
    #[arg(long)]
    appview_endpoint: String,

    /// Where to append a line per rejected/errored connection attempt.
    #[arg(long)]
    log_path: Option<std::path::PathBuf>,

    /// MOTD text written as upload-pack progress before the real stream.
    #[arg(long, default_value = "")]
    motd: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            log_failure(&args, &e.to_string());
            eprintln!("knot-guard: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<ExitCode> {
    let raw_command = std::env::var("SSH_ORIGINAL_COMMAND").unwrap_or_default();
    let parsed = command::parse(&raw_command)?;

    let client = reqwest::Client::new();
    let target_owner = identity::resolve(&client, &args.appview_endpoint, &parsed.user).await?;

    let repo_path = knot_core::secure_join_all(&args.git_dir, [target_owner.as_str(), parsed.repo.as_str()])?;
    let repo_id = format!("{}/{}", target_owner.as_str(), parsed.repo);

    if parsed.service != GitService::UploadPack {
        let allowed = check_push_allowed(&client, &args.internal_api, &args.user, &repo_id).await;
        if !allowed {
            log_failure(args, &format!("push denied for {} on {repo_id}", args.user));
            return Ok(ExitCode::FAILURE);
        }
    }

    if parsed.service == GitService::UploadPack && !args.motd.is_empty() {
        motd::write_motd(std::io::stdout(), &args.motd)?;
    }

    exec_git_service(parsed.service, &repo_path, &args.user, &parsed.user)
}

async fn check_push_allowed(client: &reqwest::Client, internal_api: &str, user: &str, repo: &str) -> bool {
    let url = format!("{internal_api}/push-allowed?user={user}&repo={repo}");
    match client.get(&url).send().await {
        Ok(resp) => resp.status() == reqwest::StatusCode::NO_CONTENT,
        Err(_) => false,
    }
}

#[cfg(unix)]
fn exec_git_service(
    service: GitService,
    repo_path: &std::path::Path,
    user_did: &str,
    user_handle: &str,
) -> anyhow::Result<ExitCode> {
    use std::os::unix::process::CommandExt;
    let err = std::process::Command::new(service.as_str())
        .arg(".")
        .current_dir(repo_path)
        .env("GIT_USER_DID", user_did)
        .env("GIT_USER_HANDLE", user_handle)
        .env("GIT_USER_PDS_ENDPOINT", "")
        .exec();
    Err(anyhow::anyhow!("failed to exec {}: {err}", service.as_str()))
}

#[cfg(not(unix))]
fn exec_git_service(
    service: GitService,
    repo_path: &std::path::Path,
    user_did: &str,
    user_handle: &str,
) -> anyhow::Result<ExitCode> {
    let status = std::process::Command::new(service.as_str())
        .arg(".")
        .current_dir(repo_path)
        .env("GIT_USER_DID", user_did)
        .env("GIT_USER_HANDLE", user_handle)
        .env("GIT_USER_PDS_ENDPOINT", "")
        .status()?;
    Ok(if status.success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn log_failure(args: &Args, message: &str) {
    let Some(path) = &args.log_path else { return };
    use std::io::Write;
    if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "[knot-guard] user={} : {message}", args.user);
    }
}
