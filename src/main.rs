use clap::{Parser, Subcommand};
use freeblog::{init_database, run_server, set_admin_password, ServerError};

/// FreeBlog server.
#[derive(Parser)]
#[clap(version, about)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web server (the default).
    Serve,
    /// Create the database file and its tables.
    Init,
    /// Set the administrator's password.
    AdminPassword,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    match Cli::parse().command.unwrap_or(Command::Serve) {
        Command::Serve => run_server().await,
        Command::Init => init_database().await,
        Command::AdminPassword => set_admin_password().await,
    }
}
