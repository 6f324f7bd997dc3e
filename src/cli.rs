use clap::{Parser, Subcommand};

use crate::models::user::Role;

/// Maintenance Platform API server and operator tools
#[derive(Parser)]
#[command(name = "maintenance-api", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server (default)
    Serve {
        /// Port to bind; overrides PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Apply pending database migrations and exit
    Migrate,

    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a user with any role (registration over HTTP only creates technicians)
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "MAINTENANCE_USER_PASSWORD", hide_env_values = true)]
        password: String,
        /// admin, supervisor or technician
        #[arg(long, default_value = "technician")]
        role: Role,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
    /// List users
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_parses() {
        let cli = Cli::try_parse_from(["maintenance-api"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_serve_with_port() {
        let cli = Cli::try_parse_from(["maintenance-api", "serve", "--port", "9001"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve { port: Some(9001) })));
    }

    #[test]
    fn test_user_create_parses_role() {
        let cli = Cli::try_parse_from([
            "maintenance-api",
            "user",
            "create",
            "--username",
            "chief",
            "--email",
            "chief@plant.example",
            "--password",
            "s3cure-pass",
            "--role",
            "supervisor",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::User {
                command: UserCommands::Create { role, username, .. },
            }) => {
                assert_eq!(role, Role::Supervisor);
                assert_eq!(username, "chief");
            }
            _ => panic!("expected user create"),
        }
    }

    #[test]
    fn test_user_create_rejects_unknown_role() {
        let result = Cli::try_parse_from([
            "maintenance-api",
            "user",
            "create",
            "--username",
            "chief",
            "--email",
            "chief@plant.example",
            "--password",
            "s3cure-pass",
            "--role",
            "overlord",
        ]);
        assert!(result.is_err());
    }
}
