use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(about = "Keeps the most recent JSON payload posted to it", version)]
pub struct Config {
    #[clap(long, env = "LATEST_PORT", default_value_t = 5000, help = "Port to listen on.")]
    pub port: u16,

    #[clap(long, env = "LATEST_LOG_DIR", default_value = "./logs", help = "Directory for log files.")]
    pub log_dir: PathBuf,

    #[clap(long, env = "LATEST_LOG_LEVEL", default_value = "info", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::try_parse_from(["server_latest", "--port", "8080", "--log-level", "debug"]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_dir, PathBuf::from("./logs"));
    }
}
