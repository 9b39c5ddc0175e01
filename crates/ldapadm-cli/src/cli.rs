//! Command-line arguments.

use clap::{ArgGroup, Args, Parser, Subcommand};
use ldapadm_core::DEFAULT_CONFIG_PATH;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ldapadm")]
#[command(author = "ldapadm Team")]
#[command(version)]
#[command(
    about = "Perform common LDAP administrative tasks: fetch objects and their attributes, \
             manage group members, create and delete objects",
    long_about = None,
    after_help = "For help on a specific command, run \"ldapadm <command> -h\"."
)]
#[command(group(ArgGroup::new("auth").args(["kerb", "username", "no_auth"])))]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// YAML configuration merged over the file; may be repeated
    #[arg(short, long = "options", value_name = "YAML")]
    pub options: Vec<String>,

    /// Print colorized, human-readable output instead of YAML
    #[arg(short = 'r', long)]
    pub pretty: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Use kerberos authentication (requires a build with the `gssapi` feature)
    #[arg(short, long)]
    pub kerb: bool,

    /// Use simple authentication as this user
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password for simple authentication
    #[arg(short, long, requires = "username")]
    pub password: Option<String>,

    /// Do not authenticate; bind anonymously
    #[arg(short, long)]
    pub no_auth: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Retrieve exactly one entry per name
    Get(SingleTypeArgs),
    /// Prefix search; zero or more results per term
    Search(SingleTypeArgs),
    /// Create new objects
    Create(SingleTypeArgs),
    /// Delete existing objects
    Delete(SingleTypeArgs),
    /// Insert members (of any type) into a group
    Insert(MembershipArgs),
    /// Remove members (of any type) from a group
    Remove(MembershipArgs),
}

#[derive(Debug, Args)]
pub struct SingleTypeArgs {
    /// Configured item type of the objects
    pub object_type: String,

    /// Names matched against the type's identifier attribute
    #[arg(required = true)]
    pub object_name: Vec<String>,
}

#[derive(Debug, Args)]
pub struct MembershipArgs {
    /// Configured item type of the group
    pub group_type: String,

    /// Name of the group
    pub group_name: String,

    /// Configured item type of the members
    pub member_type: String,

    /// Names of the members
    #[arg(required = true)]
    pub member_name: Vec<String>,
}
