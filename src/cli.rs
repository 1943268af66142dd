use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "scriptdeck", about = "Run categorized PowerShell scripts with typed parameters", version)]
pub struct Cli {
    /// Script library root (one directory per category).
    #[arg(long = "script-root", global = true)]
    pub script_root: Option<String>,

    /// PowerShell executable to invoke.
    #[arg(long = "pwsh", global = true)]
    pub pwsh: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List script categories and the scripts in each.
    List,

    /// Show a script's parsed descriptor.
    Show { category: String, script: String },

    /// Run a script, streaming its output until completion or Ctrl-C.
    Run {
        category: String,
        script: String,

        /// Argument binding, repeatable.
        #[arg(short = 'a', long = "arg", value_name = "KEY=VALUE", action = clap::ArgAction::Append)]
        args: Vec<String>,

        /// Treat password-class bindings as base64-encoded.
        #[arg(long = "b64-passwords")]
        b64_passwords: bool,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
