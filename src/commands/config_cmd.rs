use clap::{Args, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::config::Config;

#[derive(Clone, Debug, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# odai configuration

# Relay server (http:// or https://; the WebSocket endpoint is <server_url>/ws)
server_url: http://localhost:3000

# Where `odai watch` saves canvases (relative to this file)
# output_dir: drawings

# Backing canvas resolution
canvas:
  width: 1920
  height: 1920

# Reconnect delays in milliseconds
retry:
  close_delay_ms: 100
  error_delay_ms: 1000
"#;

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        config_path: Option<&Path>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => print!("{}", render_text(config)),
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let default_path = Config::default_config_path();
                let config_path = config_path.unwrap_or(default_path.as_path());

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'odai config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}

fn render_text(config: &Config) -> String {
    let mut out = String::new();
    out.push_str("Configuration\n");
    out.push_str("=============\n\n");

    match &config.config_file {
        Some(path) => out.push_str(&format!("Config file: {}\n", path.display())),
        None => out.push_str(&format!(
            "Config file: {} (not found)\n",
            Config::default_config_path().display()
        )),
    }
    out.push('\n');

    out.push_str(&format!("server_url: {}\n", config.server_url.value));
    out.push_str(&format!("  source: {}\n\n", config.server_url.source));

    out.push_str(&format!("output_dir: {}\n", config.output_dir.value.display()));
    out.push_str(&format!("  source: {}\n\n", config.output_dir.source));

    out.push_str(&format!(
        "canvas: {}x{}\n",
        config.canvas.width, config.canvas.height
    ));
    out.push_str(&format!(
        "retry: close {}ms, error {}ms\n",
        config.retry.close_delay_ms, config.retry.error_delay_ms
    ));
    out
}
