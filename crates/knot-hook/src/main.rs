//! `knot-hook` -- invoked as `hooks/post-receive.d/40-notify.sh`. Reads
//! the raw post-receive stdin (`old_sha new_sha ref` lines) and forwards
//! it to the knot's internal HTTP API, which turns it into change records.
//!
//! Never fails the push: any error here is logged to stderr (visible to
//! the pusher as hook output) but the process still exits zero.

use std::io::Read;
use std::process::ExitCode;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "knot-hook")]
struct Args {
    /// Loopback base URL of the knot's internal HTTP API.
    #[arg(long)]
    internal_api: String,

    /// Absolute path of the bare repo the push landed in, forwarded as
    /// `X-Git-Dir` so the knot can identify `<did>/<repo>`.
    #[arg(long)]
    git_dir: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut body = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut body) {
        eprintln!("knot-hook: failed to read post-receive stdin: {e}");
        return ExitCode::SUCCESS;
    }

    if let Err(e) = notify(&args, body).await {
        eprintln!("knot-hook: failed to notify knot: {e}");
    }
    ExitCode::SUCCESS
}

async fn notify(args: &Args, body: String) -> anyhow::Result<()> {
    let user_did = std::env::var("GIT_USER_DID").unwrap_or_default();
    let user_handle = std::env::var("GIT_USER_HANDLE").unwrap_or_default();

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/hooks/post-receive", args.internal_api))
        .header("X-Git-Dir", &args.git_dir)
        .header("X-Git-User-Did", user_did)
        .header("X-Git-User-Handle", user_handle)
        .body(body)
        .send()
        .await?;

    if !resp.status().is_success() {
        anyhow::bail!("knot returned {}", resp.status());
    }
    Ok(())
}
