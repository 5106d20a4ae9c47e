//! Command-line parsing
//!
//! `devsite-console [--config PATH] [--metrics] <command> [arg]`

use anyhow::{Result, bail};

pub const USAGE: &str = "usage: devsite-console [--config PATH] [--metrics] \
<status | whoami | login | logout | get <path> | open <route>>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Session phase and identity after startup restore.
    Status,
    /// Current user as reported by the API.
    Whoami,
    /// Sign in with the configured account.
    Login,
    Logout,
    /// GET an API path and print the JSON body.
    Get(String),
    /// Run the navigation guard for a console route.
    Open(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub config: Option<String>,
    pub metrics: bool,
    pub command: Command,
}

impl Cli {
    /// Parse arguments, excluding the program name.
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = None;
        let mut metrics = false;
        let mut positional = Vec::new();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => match args.next() {
                    Some(path) => config = Some(path),
                    None => bail!("--config requires a path\n{USAGE}"),
                },
                "--metrics" => metrics = true,
                flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let command = match positional.next().as_deref() {
            Some("status") => Command::Status,
            Some("whoami") => Command::Whoami,
            Some("login") => Command::Login,
            Some("logout") => Command::Logout,
            Some("get") => match positional.next() {
                Some(path) => Command::Get(path),
                None => bail!("get requires an API path\n{USAGE}"),
            },
            Some("open") => match positional.next() {
                Some(route) => Command::Open(route),
                None => bail!("open requires a route\n{USAGE}"),
            },
            Some(other) => bail!("unknown command {other}\n{USAGE}"),
            None => bail!("{USAGE}"),
        };

        if let Some(extra) = positional.next() {
            bail!("unexpected argument {extra}\n{USAGE}");
        }

        Ok(Self {
            config,
            metrics,
            command,
        })
    }
}
