use clap::{Parser, Subcommand, ValueEnum};

use crate::models::Role;
use crate::sync::{EditorModel, EditingSession, SaveOutcome};

/// Terminal client for inlyne collaborative documents
#[derive(Parser, Debug)]
#[command(name = "inlyne")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Override the API base URL
    #[arg(long, global = true, env = "INLYNE_API_BASE")]
    pub api_base: Option<String>,

    /// Session file to use instead of the default one
    #[arg(long, global = true)]
    pub session_file: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and store the session
    Login {
        email: String,

        #[arg(long, env = "INLYNE_PASSWORD", hide_env_values = true)]
        password: String,

        /// Hand the token to this URL instead of storing it (e.g. vscode://…)
        #[arg(long)]
        redirect: Option<String>,
    },

    /// Create an account
    Signup {
        username: String,
        email: String,

        #[arg(long, env = "INLYNE_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        confirm: String,
    },

    /// Forget the stored session
    Logout,

    /// Show who the stored token belongs to
    Whoami,

    /// Show or change the profile
    Profile {
        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long, requires = "confirm")]
        password: Option<String>,

        #[arg(long)]
        confirm: Option<String>,
    },

    /// Create an empty document
    Create,

    /// List accessible documents
    Docs,

    /// Print a document
    Show { doc: String },

    /// Open a document live; every stdin line replaces its content.
    /// `:save` stores it, `:quit` leaves.
    Edit { doc: String },

    /// Store the content of a file (or stdin) as the document
    Save {
        doc: String,

        #[arg(long)]
        file: Option<std::path::PathBuf>,
    },

    /// Make a document public or private
    Public {
        doc: String,

        #[arg(action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
        public: bool,
    },

    /// Grant a user a role on a document
    Share {
        doc: String,
        email: String,

        #[arg(value_enum, default_value = "writer")]
        role: RoleArg,
    },

    /// Revoke a user's role on a document
    Unshare {
        doc: String,
        email: String,

        #[arg(value_enum, default_value = "writer")]
        role: RoleArg,
    },

    /// Change a document's title
    Rename { doc: String, title: String },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum RoleArg {
    Reader,
    Writer,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Reader => Role::Reader,
            RoleArg::Writer => Role::Writer,
            RoleArg::Admin => Role::Admin,
        }
    }
}

/// Commands stdin lines may carry during a live edit
#[derive(Debug, PartialEq, Eq)]
pub enum EditLine<'a> {
    Save,
    Quit,
    Replace(&'a str),
}

impl<'a> EditLine<'a> {
    pub fn parse(line: &'a str) -> Self {
        match line.trim() {
            ":save" | ":w" => EditLine::Save,
            ":quit" | ":q" => EditLine::Quit,
            _ => EditLine::Replace(line.trim_end_matches(['\r', '\n'])),
        }
    }
}

/// What the live edit loop does after one stdin line
#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// Keep editing, printing the message if there is one
    Continue(Option<String>),
    Quit,
}

/// Apply one stdin line to the session. Refused edits and saves are reported
/// and leave the session open.
pub async fn apply_edit_line<E: EditorModel>(session: &mut EditingSession<E>, line: &str) -> LineOutcome {
    match EditLine::parse(line) {
        EditLine::Quit => LineOutcome::Quit,
        EditLine::Save => {
            let message = match session.save().await {
                Ok(SaveOutcome { published, stored: Ok(()) }) => format!("saved (broadcast: {})", published),
                Ok(SaveOutcome { published, stored: Err(e) }) => {
                    format!("save failed: {} (broadcast: {})", e, published)
                }
                Err(e) => format!("save refused: {}", e),
            };
            LineOutcome::Continue(Some(message))
        }
        EditLine::Replace(html) => match session.edit(html) {
            Ok(_) => LineOutcome::Continue(None),
            Err(e) => LineOutcome::Continue(Some(e.to_string())),
        },
    }
}
