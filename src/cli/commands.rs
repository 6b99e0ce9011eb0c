use clap::{Arg, ArgMatches, Command};
use log::info;

use crate::config::Config;
use crate::output::formatter_for;
use crate::serial::list_serial_ports;
use crate::services::Aggregator;
use crate::utils::error::SensorError;

pub fn build_cli() -> Command {
    Command::new("pumpreader")
        .version(crate::VERSION)
        .about("Polls vacuum gauges, a pyrometer and an analog gas-pressure channel")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .global(true),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("SECONDS")
                .help("Poll interval override")
                .global(true),
        )
        .arg(
            Arg::new("api-port")
                .long("api-port")
                .value_name("PORT")
                .help("HTTP API port override")
                .global(true),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .value_parser(["console", "json", "csv"])
                .default_value("console")
                .help("Output format for one-shot commands")
                .global(true),
        )
        .arg(
            Arg::new("status-every")
                .long("status-every")
                .value_name("SECONDS")
                .help("Print the status view periodically while running")
                .global(true),
        )
        .subcommand(Command::new("run").about("Poll every device until interrupted (default)"))
        .subcommand(Command::new("snapshot").about("Poll every device once and print the readings"))
        .subcommand(Command::new("status").about("Poll every device once and print the status view"))
        .subcommand(
            Command::new("laser")
                .about("Switch the pyrometer's aiming laser")
                .arg(
                    Arg::new("state")
                        .required(true)
                        .value_parser(["on", "off"]),
                ),
        )
        .subcommand(Command::new("reset-max").about("Reset the pyrometer's stored maximum"))
        .subcommand(Command::new("list-ports").about("List the serial ports on this machine"))
        .subcommand(Command::new("default-config").about("Print the built-in configuration as TOML"))
}

/// Commands that need no devices. Returns true if one ran.
pub fn handle_offline_commands(matches: &ArgMatches, config: &Config) -> Result<bool, SensorError> {
    if matches.subcommand_matches("list-ports").is_some() {
        let ports = list_serial_ports()?;
        if ports.is_empty() {
            println!("⚠️  No serial ports found");
        }
        for (index, port) in ports.iter().enumerate() {
            println!("   {}. {}", index + 1, port);
        }
        return Ok(true);
    }

    if matches.subcommand_matches("default-config").is_some() {
        print!("{}", config.to_toml()?);
        return Ok(true);
    }

    Ok(false)
}

/// One-shot commands against the opened devices. Returns true if one ran,
/// false when the process should keep polling.
pub async fn handle_subcommands(matches: &ArgMatches, aggregator: &Aggregator) -> Result<bool, SensorError> {
    let format = matches.get_one::<String>("format").map(String::as_str).unwrap_or("console");
    let formatter = formatter_for(format);

    if matches.subcommand_matches("snapshot").is_some() {
        info!("🔍 Executing snapshot command...");
        aggregator.registry().refresh_once().await?;
        print!("{}", formatter.format(&aggregator.snapshot()));
        return Ok(true);
    }

    if matches.subcommand_matches("status").is_some() {
        info!("🔍 Executing status command...");
        aggregator.registry().refresh_once().await?;
        print!("{}", formatter.format_status(&aggregator.status_view()));
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("laser") {
        let on = matches.get_one::<String>("state").map(String::as_str) == Some("on");
        aggregator.laser_control(on).await?;
        println!("✅ Laser switched {}", if on { "on" } else { "off" });
        return Ok(true);
    }

    if matches.subcommand_matches("reset-max").is_some() {
        aggregator.reset_max().await?;
        println!("✅ Pyrometer maximum reset");
        return Ok(true);
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_overrides() {
        let matches = build_cli()
            .try_get_matches_from(["pumpreader", "snapshot", "--format", "json", "-i", "2"])
            .unwrap();
        assert!(matches.subcommand_matches("snapshot").is_some());
        assert_eq!(matches.get_one::<String>("format").unwrap(), "json");

        let config = Config::from_matches(&matches).unwrap();
        assert_eq!(config.polling.interval_ms, 2000);
    }

    #[test]
    fn test_oversized_interval_is_a_config_error() {
        let matches = build_cli()
            .try_get_matches_from(["pumpreader", "-i", "18446744073709552"])
            .unwrap();
        let err = Config::from_matches(&matches).unwrap_err();
        assert!(matches!(err, SensorError::ConfigError(_)));
    }

    #[test]
    fn test_status_every_accepted_after_run() {
        let matches = build_cli()
            .try_get_matches_from(["pumpreader", "run", "--status-every", "5"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("status-every").unwrap(), "5");
    }

    #[test]
    fn test_laser_requires_on_or_off() {
        assert!(build_cli().try_get_matches_from(["pumpreader", "laser", "dim"]).is_err());
        assert!(build_cli().try_get_matches_from(["pumpreader", "laser", "off"]).is_ok());
    }

    #[test]
    fn test_default_config_is_offline() {
        let matches = build_cli().try_get_matches_from(["pumpreader", "default-config"]).unwrap();
        assert!(handle_offline_commands(&matches, &Config::default()).unwrap());

        let matches = build_cli().try_get_matches_from(["pumpreader"]).unwrap();
        assert!(!handle_offline_commands(&matches, &Config::default()).unwrap());
    }
}
