//! `abot console` -- chat with a running server.
//!
//! Reads one utterance per line from stdin, POSTs it to the server's
//! front-end and prints the reply. Ends at EOF (Ctrl+D).
//!
//! ```text
//! abot console localhost:8080 +15551234567
//! ```

use std::io::Write;

use anyhow::Context;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use abot_types::FlexIdType;

/// Arguments for the `abot console` subcommand.
#[derive(Args, Debug)]
pub struct ConsoleArgs {
    /// Server address, e.g. `localhost:8080` or `http://host:8080`.
    pub addr: String,

    /// Identifier to chat as (a phone number unless `--flexidtype` says
    /// otherwise).
    pub flexid: String,

    /// Identifier space: 1 = email, 2 = phone, 3 = web session.
    #[arg(long, default_value_t = 2)]
    pub flexidtype: i64,
}

/// Base URL for `addr`, adding `http://` when no scheme is given.
pub fn base_url(addr: &str) -> String {
    let addr = addr.trim().trim_end_matches('/');
    if addr.starts_with("http://") || addr.starts_with("https://") {
        format!("{addr}/")
    } else {
        format!("http://{addr}/")
    }
}

/// Run the `console` command.
pub async fn run(args: ConsoleArgs) -> anyhow::Result<()> {
    let space = FlexIdType::try_from(args.flexidtype)?;
    let url = base_url(&args.addr);
    let client = reqwest::Client::new();
    let code = space.code().to_string();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            prompt()?;
            continue;
        }

        let resp = client
            .post(&url)
            .query(&[
                ("flexidtype", code.as_str()),
                ("flexid", args.flexid.as_str()),
                ("cmd", line),
            ])
            .send()
            .await
            .with_context(|| format!("cannot reach {url}"))?;
        let status = resp.status();
        let body = resp.text().await?;
        debug!(status = status.as_u16(), "reply received");

        if status.is_success() {
            println!("{body}");
        } else {
            eprintln!("[{}] {body}", status.as_u16());
        }
        prompt()?;
    }
    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    let mut out = std::io::stdout();
    write!(out, "> ")?;
    out.flush()
}
