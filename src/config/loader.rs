//! Configuration loading
//!
//! Loads configuration from a TOML file with environment variable
//! substitution, then applies environment overrides on top.

use crate::config::schema::MeridianConfig;
use crate::config::secret_string;
use crate::domain::{MeridianError, Result};
use regex::Regex;
use std::env;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// Supports `${VAR}` environment variable substitution within the file and
/// flat environment overrides applied after parsing (e.g. `CLIENT_ID`,
/// `BATCH_SIZE`, `OUTPUT_DIRECTORY`).
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or fails validation.
pub fn load_config(path: &Path) -> Result<MeridianConfig> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    let content = std::fs::read_to_string(path).map_err(|e| {
        MeridianError::Configuration(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let content = substitute_env_vars(&content)?;

    let mut config: MeridianConfig = toml::from_str(&content).map_err(|e| {
        MeridianError::Configuration(format!("Failed to parse config file: {e}"))
    })?;

    apply_env_overrides(&mut config)?;

    config
        .validate()
        .map_err(MeridianError::Configuration)?;

    Ok(config)
}

/// Substitutes `${VAR}` patterns with environment variable values.
/// Lines starting with `#` are left untouched.
fn substitute_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| MeridianError::Configuration(format!("Invalid regex: {e}")))?;

    let mut result = String::with_capacity(content.len());
    for line in content.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
        } else {
            let replaced = re.replace_all(line, |caps: &regex::Captures| {
                let var_name = &caps[1];
                env::var(var_name).unwrap_or_else(|_| format!("${{{var_name}}}"))
            });
            result.push_str(&replaced);
        }
        result.push('\n');
    }
    Ok(result)
}

/// Applies flat environment overrides on top of the parsed file.
///
/// An override replaces the file value only when the variable is set.
fn apply_env_overrides(config: &mut MeridianConfig) -> Result<()> {
    if let Ok(v) = env::var("CLIENT_ID") {
        config.auth.client_id = v;
    }
    if let Ok(v) = env::var("RESOURCE_SECURITY_ID") {
        config.auth.resource_security_id = secret_string(v);
    }
    if let Ok(v) = env::var("AGENCY_SECRET") {
        config.auth.agency_secret = secret_string(v);
    }
    if let Ok(v) = env::var("TOKEN_URL") {
        config.auth.token_url = v;
    }
    if let Ok(v) = env::var("API_BASE_URL") {
        config.api.base_url = v;
    }
    if let Ok(v) = env::var("REQUEST_TIMEOUT") {
        config.api.request_timeout_secs = parse_env("REQUEST_TIMEOUT", &v)?;
    }
    if let Ok(v) = env::var("TOKEN_ROTATION_COUNT") {
        config.api.token_rotation_count = parse_env("TOKEN_ROTATION_COUNT", &v)?;
    }
    if let Ok(v) = env::var("MAX_RETRIES") {
        config.api.max_retries = parse_env("MAX_RETRIES", &v)?;
    }
    if let Ok(v) = env::var("BATCH_SIZE") {
        config.extract.batch_size = parse_env("BATCH_SIZE", &v)?;
    }
    if let Ok(v) = env::var("MAX_WORKERS") {
        config.extract.max_workers = parse_env("MAX_WORKERS", &v)?;
    }
    if let Ok(v) = env::var("PATIENT_BATCH_SIZE") {
        config.extract.patient_batch_size = parse_env("PATIENT_BATCH_SIZE", &v)?;
    }
    if let Ok(v) = env::var("ENCOUNTER_BATCH_SIZE") {
        config.extract.encounter_batch_size = parse_env("ENCOUNTER_BATCH_SIZE", &v)?;
    }
    if let Ok(v) = env::var("OUTPUT_DIRECTORY") {
        config.output.directory = v.into();
    }
    if let Ok(v) = env::var("MERIDIAN_LOG_LEVEL") {
        config.application.log_level = v;
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| {
        MeridianError::Configuration(format!("Invalid value for {name} ('{value}'): {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_CONFIG: &str = r#"
[auth]
client_id = "client-1"
resource_security_id = "rsid"
agency_secret = "secret"
token_url = "https://idp.example.com/connect/token"

[api]
base_url = "https://api.example.com/fhir/r4"
"#;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config() {
        let file = write_config(MINIMAL_CONFIG);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.auth.client_id, "client-1");
        assert_eq!(config.api.request_timeout_secs, 45);
        assert_eq!(config.extract.batch_size, 100);
        assert_eq!(config.extract.max_workers, 5);
    }

    #[test]
    fn test_substitute_env_vars() {
        env::set_var("MERIDIAN_TEST_SUBST", "replaced");
        let result = substitute_env_vars("value = \"${MERIDIAN_TEST_SUBST}\"").unwrap();
        assert_eq!(result, "value = \"replaced\"\n");
        env::remove_var("MERIDIAN_TEST_SUBST");
    }

    #[test]
    fn test_substitute_skips_comments() {
        let result = substitute_env_vars("# note about ${UNSET_VAR_HERE}").unwrap();
        assert_eq!(result, "# note about ${UNSET_VAR_HERE}\n");
    }

    #[test]
    fn test_unset_var_left_in_place() {
        let result = substitute_env_vars("value = \"${DEFINITELY_NOT_SET_XYZ}\"").unwrap();
        assert!(result.contains("${DEFINITELY_NOT_SET_XYZ}"));
    }

    #[test]
    fn test_missing_file_errors() {
        let result = load_config(Path::new("/nonexistent/meridian.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_toml_errors() {
        let file = write_config("this is not toml [");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_invalid_numeric_override_rejected() {
        let err = parse_env::<usize>("BATCH_SIZE", "not-a-number");
        assert!(err.is_err());
    }
}
