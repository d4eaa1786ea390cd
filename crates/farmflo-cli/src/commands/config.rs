use farmflo_core::config::ClientConfig;
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ConfigReport {
    pub project_id: Option<String>,
    pub api_key_set: bool,
    pub media_api_base_url: Option<String>,
    pub missing: Vec<&'static str>,
}

impl From<&ClientConfig> for ConfigReport {
    fn from(config: &ClientConfig) -> Self {
        Self {
            project_id: config.project_id.clone(),
            api_key_set: config.api_key.is_some(),
            media_api_base_url: config.media_api_base_url.clone(),
            missing: config.missing(),
        }
    }
}

pub fn run_config_check(as_json: bool) -> Result<(), CliError> {
    let config = ClientConfig::from_env()?;
    tracing::debug!("Loaded {:?}", config);
    let report = ConfigReport::from(&config);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_config_report(&report) {
            println!("{line}");
        }
    }

    Ok(())
}

pub fn format_config_report(report: &ConfigReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "project id:     {}",
            report.project_id.as_deref().unwrap_or("(not set)")
        ),
        format!(
            "api key:        {}",
            if report.api_key_set { "set" } else { "(not set)" }
        ),
        format!(
            "media api url:  {}",
            report.media_api_base_url.as_deref().unwrap_or("(not set)")
        ),
    ];
    if report.missing.is_empty() {
        lines.push("All settings present.".to_string());
    } else {
        lines.push(format!("Missing: {}", report.missing.join(", ")));
    }
    lines
}
