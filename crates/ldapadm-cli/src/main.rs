//! ldapadm
//!
//! Command-line tool for common LDAP administrative tasks.

use anyhow::{Context, Result};
use clap::Parser;
use ldapadm_core::ToolConfig;
use ldapadm_directory::{all_succeeded, AdminTool, Outcome};
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod render;

use cli::{Cli, Command};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcomes = match run(&cli).await {
        Ok(outcomes) => outcomes,
        Err(err) => {
            eprintln!("ldapadm: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    if cli.pretty {
        println!("{}", render::pretty(&outcomes));
    } else {
        match render::yaml(&outcomes) {
            Ok(yaml) => print!("{yaml}"),
            Err(err) => {
                eprintln!("ldapadm: failed to render output: {err}");
                return ExitCode::FAILURE;
            }
        }
    }

    if all_succeeded(&outcomes) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Loads configuration, connects, and runs the requested command.
///
/// Errors returned here are fatal for the whole invocation; per-target failures are
/// reported in the outcomes instead.
async fn run(cli: &Cli) -> Result<Vec<Outcome>> {
    let config = load_config(cli)?;
    let mut tool = AdminTool::connect(config)
        .await
        .context("failed to connect to the directory")?;

    let outcomes = match &cli.command {
        Command::Get(args) => tool.get(&args.object_type, &args.object_name).await,
        Command::Search(args) => tool.search(&args.object_type, &args.object_name).await,
        Command::Create(args) => tool.create(&args.object_type, &args.object_name).await,
        Command::Delete(args) => tool.delete(&args.object_type, &args.object_name).await,
        Command::Insert(args) => {
            tool.insert(
                &args.group_type,
                &args.group_name,
                &args.member_type,
                &args.member_name,
            )
            .await
        }
        Command::Remove(args) => {
            tool.remove(
                &args.group_type,
                &args.group_name,
                &args.member_type,
                &args.member_name,
            )
            .await
        }
    };

    if let Err(err) = tool.close().await {
        warn!(error = %err, "unbind failed");
    }
    Ok(outcomes)
}

fn load_config(cli: &Cli) -> Result<ToolConfig> {
    let config = ToolConfig::load(&cli.config, &cli.options)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    debug!(item_types = ?config.item_type_names().collect::<Vec<_>>(), "configuration loaded");

    let config = if cli.kerb {
        config.with_kerberos()
    } else if let Some(username) = &cli.username {
        config.with_simple_auth(username.clone(), cli.password.clone())
    } else if cli.no_auth {
        config.with_anonymous()
    } else {
        config
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldapadm_core::AuthMode;
    use std::io::Write;

    fn config_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "uri: ldap://ldap.example.edu\nauth_type: kerb\nuser:\n  base: dc=example\n  identifier: uid"
        )
        .unwrap();
        file
    }

    #[test]
    fn auth_flags_override_file() {
        let file = config_file();
        let path = file.path().to_str().unwrap();

        let cli = Cli::try_parse_from(["ldapadm", "-c", path, "-n", "get", "user", "a"]).unwrap();
        assert_eq!(load_config(&cli).unwrap().auth_type, AuthMode::None);

        let cli = Cli::try_parse_from(["ldapadm", "-c", path, "-u", "admin", "get", "user", "a"])
            .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.auth_type, AuthMode::Simple);
        assert_eq!(config.username.as_deref(), Some("admin"));

        let cli = Cli::try_parse_from(["ldapadm", "-c", path, "get", "user", "a"]).unwrap();
        assert_eq!(load_config(&cli).unwrap().auth_type, AuthMode::Kerberos);
    }

    #[test]
    fn option_fragments_override_file() {
        let file = config_file();
        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from([
            "ldapadm", "-c", path, "-o", "{user: {base: ou=People}}", "get", "user", "a",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        let user = config.item_type("user").unwrap();
        assert_eq!(user.base, "ou=People");
        assert_eq!(user.identifier, "uid");
    }

    #[test]
    fn missing_config_is_fatal() {
        let cli = Cli::try_parse_from(["ldapadm", "-c", "/nonexistent/ldapadm.yaml", "get", "user", "a"])
            .unwrap();
        assert!(load_config(&cli).is_err());
    }
}
