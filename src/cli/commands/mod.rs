use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

/// Pure clap command definitions with zero business logic
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("target")
                .action(ArgAction::Append)
                .env("CERTPULSE_TARGETS")
                .help("endpoint to check: <host>[:<port>][@<servername>]")
                .long("target")
                .long_help(
                    "Endpoint to check, repeatable and comma separated:\n\
                    <host>[:<port>][@<servername>]\n\n\
                    The port defaults to 443 and the servername (SNI) defaults to the host.\n\
                    IPv6 literals go in brackets.\n\n\
                    Examples:\n\
                    - example.com\n\
                    - 10.0.0.7:8443@www.example.com\n\
                    - [2001:db8::1]:443@www.example.com",
                )
                .short('t')
                .value_delimiter(',')
                .value_name("TARGET"),
        )
        .arg(
            Arg::new("targets-file")
                .env("CERTPULSE_TARGETS_FILE")
                .help("file with one target per line ('#' starts a comment)")
                .long("targets-file")
                .short('f')
                .value_name("PATH")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            Arg::new("grace-period")
                .default_value("0.10")
                .env("CERTPULSE_GRACE_PERIOD")
                .help("fraction of the certificate lifetime reported as expiring, in [0, 1]")
                .long("grace-period")
                .long_help(
                    "Fraction of the total certificate lifetime (notAfter - notBefore)\n\
                    before notAfter at which the certificate is reported as expiring.\n\n\
                    Example: 0.10 with a 90 day certificate reports expiring 9 days\n\
                    before notAfter.",
                )
                .short('g')
                .value_name("FRACTION")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("timeout")
                .default_value("10")
                .env("CERTPULSE_TIMEOUT")
                .help("seconds allowed for resolve, connect and handshake (0 disables)")
                .long("timeout")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("concurrency")
                .default_value("8")
                .env("CERTPULSE_CONCURRENCY")
                .help("maximum number of probes in flight")
                .long("concurrency")
                .short('c')
                .value_parser(clap::value_parser!(u16).range(1..)),
        )
        .arg(
            Arg::new("ca")
                .env("CERTPULSE_CA")
                .help("PEM file with trust anchors, enables chain verification")
                .long("ca")
                .long_help(
                    "Path to a PEM file with one or more CA certificates.\n\
                    The presented chain is verified against these anchors; an\n\
                    untrusted chain reports the certificate as invalid.\n\n\
                    Example: /etc/ssl/certs/internal-ca.pem",
                )
                .value_name("PATH")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            Arg::new("verify-chain")
                .action(ArgAction::SetTrue)
                .conflicts_with("ca")
                .env("CERTPULSE_VERIFY_CHAIN")
                .help("verify the presented chain against the bundled web PKI roots")
                .long("verify-chain"),
        )
        .arg(
            Arg::new("interval")
                .env("CERTPULSE_INTERVAL")
                .help("number of seconds between checks, enables watch mode with /metrics")
                .long("interval")
                .short('i')
                .value_parser(clap::value_parser!(u16).range(1..)),
        )
        .arg(
            Arg::new("listen")
                .env("CERTPULSE_LISTEN")
                .help("IP address to bind to in watch mode (default: [::]:port, accepts both IPv6 and IPv4)")
                .long("listen")
                .long_help(
                    "IP address to bind to:\n\
                    Not specified (default) binds to [::]:port which accepts both IPv6 and IPv4 connections.\n\
                    Falls back to 0.0.0.0:port if IPv6 is unavailable.\n\n\
                    Specific IPv4 examples: '0.0.0.0', '127.0.0.1'\n\
                    Specific IPv6: '::', '::1'",
                )
                .requires("interval")
                .short('l')
                .value_name("IP"),
        )
        .arg(
            Arg::new("port")
                .default_value("9400")
                .env("CERTPULSE_PORT")
                .help("listening port for /metrics in watch mode")
                .long("port")
                .short('p')
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("verbosity")
                .action(ArgAction::Count)
                .help("increase log verbosity (-v info, -vv debug, -vvv trace)")
                .short('v'),
        )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn test_new() {
        let cmd = new();
        assert_eq!(cmd.get_name(), "certpulse");
        assert_eq!(
            cmd.get_about().unwrap().to_string(),
            env!("CARGO_PKG_DESCRIPTION")
        );
        assert_eq!(
            cmd.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_new_defaults() {
        let cmd = new();
        let matches = cmd
            .try_get_matches_from(vec!["certpulse", "--target", "example.com"])
            .unwrap();

        let grace_period = matches.get_one::<f64>("grace-period").copied().unwrap();
        assert!((grace_period - 0.10).abs() < f64::EPSILON);
        assert_eq!(matches.get_one::<u64>("timeout").copied(), Some(10));
        assert_eq!(matches.get_one::<u16>("concurrency").copied(), Some(8));
        assert_eq!(matches.get_one::<u16>("port").copied(), Some(9400));
        assert_eq!(matches.get_one::<u16>("interval"), None);
        assert!(!matches.get_flag("verify-chain"));
        assert_eq!(matches.get_count("verbosity"), 0);
    }

    #[test]
    fn test_new_targets_comma_and_repeat() {
        let cmd = new();
        let matches = cmd
            .try_get_matches_from(vec![
                "certpulse",
                "-t",
                "a.example.com,b.example.com:8443",
                "--target",
                "10.0.0.7@c.example.com",
            ])
            .unwrap();

        let targets: Vec<&String> = matches.get_many::<String>("target").unwrap().collect();
        assert_eq!(
            targets,
            vec!["a.example.com", "b.example.com:8443", "10.0.0.7@c.example.com"]
        );
    }

    #[test]
    fn test_new_verbosity_count() {
        let cmd = new();
        let matches = cmd
            .try_get_matches_from(vec!["certpulse", "-t", "example.com", "-vvv"])
            .unwrap();
        assert_eq!(matches.get_count("verbosity"), 3);
    }

    #[test]
    fn test_new_ca_conflicts_with_verify_chain() {
        let cmd = new();
        let matches = cmd.try_get_matches_from(vec![
            "certpulse",
            "-t",
            "example.com",
            "--ca",
            "/tmp/ca.pem",
            "--verify-chain",
        ]);
        assert!(matches.is_err());
    }

    #[test]
    fn test_new_listen_requires_interval() {
        let cmd = new();
        let matches =
            cmd.try_get_matches_from(vec!["certpulse", "-t", "example.com", "-l", "127.0.0.1"]);
        assert!(matches.is_err());

        let cmd = new();
        let matches = cmd.try_get_matches_from(vec![
            "certpulse",
            "-t",
            "example.com",
            "-i",
            "60",
            "-l",
            "127.0.0.1",
        ]);
        assert!(matches.is_ok());
    }

    #[test]
    fn test_new_rejects_zero_interval_and_concurrency() {
        let cmd = new();
        assert!(
            cmd.try_get_matches_from(vec!["certpulse", "-t", "example.com", "-i", "0"])
                .is_err()
        );

        let cmd = new();
        assert!(
            cmd.try_get_matches_from(vec!["certpulse", "-t", "example.com", "-c", "0"])
                .is_err()
        );
    }

    #[test]
    fn test_new_rejects_non_numeric_grace_period() {
        let cmd = new();
        let matches =
            cmd.try_get_matches_from(vec!["certpulse", "-t", "example.com", "-g", "ten"]);
        assert!(matches.is_err());
    }
}
