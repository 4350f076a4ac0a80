use std::net::{IpAddr, Ipv4Addr};

use clap::{Args, Parser, Subcommand};

use crate::registry::NamePolicy;

pub const DEFAULT_PORT: u16 = 5569;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay server.
    Server(ServerArgs),
    /// Register with a relay and exchange messages interactively.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Address to bind the listening socket to.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Port to listen on. Use 0 for an ephemeral port.
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub server_port: u16,

    /// What to do when a client claims a name that is already taken.
    #[arg(long, value_enum, default_value_t = NamePolicy::Reject)]
    pub name_policy: NamePolicy,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Host name or IP address of the relay.
    #[arg(short = 's', long, default_value = "localhost")]
    pub server: String,

    /// Port of the relay.
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub server_port: u16,

    /// Display name to register under.
    #[arg(short = 'u', long, default_value = "Alice")]
    pub user: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_ones() {
        let cli = Cli::parse_from(["message-relay", "client"]);
        let Command::Client(args) = cli.command else {
            panic!("expected client subcommand");
        };
        assert_eq!(args.server, "localhost");
        assert_eq!(args.server_port, 5569);
        assert_eq!(args.user, "Alice");

        let cli = Cli::parse_from(["message-relay", "server"]);
        let Command::Server(args) = cli.command else {
            panic!("expected server subcommand");
        };
        assert_eq!(args.server_port, 5569);
        assert_eq!(args.name_policy, NamePolicy::Reject);
    }

    #[test]
    fn short_flags_and_policy() {
        let cli = Cli::parse_from([
            "message-relay",
            "client",
            "-s",
            "10.0.0.2",
            "-p",
            "7000",
            "-u",
            "Bob",
        ]);
        let Command::Client(args) = cli.command else {
            panic!("expected client subcommand");
        };
        assert_eq!(args.server, "10.0.0.2");
        assert_eq!(args.server_port, 7000);
        assert_eq!(args.user, "Bob");

        let cli = Cli::parse_from(["message-relay", "server", "--name-policy", "evict"]);
        let Command::Server(args) = cli.command else {
            panic!("expected server subcommand");
        };
        assert_eq!(args.name_policy, NamePolicy::Evict);
    }
}
