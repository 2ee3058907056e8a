//! Command-line argument parsing for storemon

use chrono::{DateTime, Utc};

use crate::model::parse_timestamp;

/// Parsed command line arguments
#[derive(Debug, Default)]
pub struct Args {
    pub once: bool,
    pub validate: bool,
    pub help: bool,
    /// Reference time override, ahead of `STOREMON_NOW`
    pub now: Option<DateTime<Utc>>,
}

pub fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from(&args)
}

/// Parse an argv-style list; the first entry is the program name
pub fn parse_args_from(args: &[String]) -> Result<Args, String> {
    let mut result = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" => result.once = true,
            "--validate" => result.validate = true,
            "--help" | "-h" => result.help = true,
            "--now" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "--now requires an RFC 3339 timestamp".to_string())?;
                result.now = Some(parse_timestamp(value).map_err(|e| format!("--now: {}", e))?);
            }
            other => return Err(format!("unknown argument {:?}", other)),
        }
        i += 1;
    }

    Ok(result)
}

pub fn print_help() {
    println!("storemon - store uptime/downtime reports\n");
    println!("USAGE:");
    println!("    storemon [OPTIONS]\n");
    println!("OPTIONS:");
    println!("    --once              Compute one report, write it and exit");
    println!("    --validate          Validate configuration and exit");
    println!("    --now TIMESTAMP     Reference time (RFC 3339), overrides STOREMON_NOW");
    println!("    --help, -h          Show this help message\n");
    println!("Without options, serves the report HTTP API until Ctrl-C.\n");
    println!("ENVIRONMENT:");
    println!("    STOREMON_DATA_DIR     Input CSV directory (default: sample_data)");
    println!("    STOREMON_REPORT_DIR   Report output directory (default: reports)");
    println!("    STOREMON_DEFAULT_TZ   Zone for stores without one (default: America/Chicago)");
    println!("    STOREMON_HTTP_PORT    HTTP port (default: 8000)");
    println!("    STOREMON_NOW          Reference time override (RFC 3339)");
}
