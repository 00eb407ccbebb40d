use std::fmt;
use std::path::Path;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::errors::ClientError;
use crate::errors::Result;
use crate::signer::Credentials;
use crate::signer::SecretEncoding;

pub const SANDBOX_URL: &str = "https://api.sandbox.com";

/// Startup settings for the client.
///
/// Read from `BASE_URL`, `API_KEY`, `API_SECRET`, `API_PASSPHRASE`,
/// `API_SANDBOX`, `RETRY_COUNT` and `SECRET_ENCODING`, optionally layered
/// over a TOML file using the same keys in lowercase.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
    pub api_sandbox: bool,
    pub retry_count: u32,
    pub secret_encoding: SecretEncoding,
}

impl ClientSettings {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.api_key.clone(), self.api_secret.clone(), self.api_passphrase.clone())
    }
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials())
            .field("api_sandbox", &self.api_sandbox)
            .field("retry_count", &self.retry_count)
            .field("secret_encoding", &self.secret_encoding)
            .finish()
    }
}

/// Load settings from the environment, on top of an optional TOML file
pub fn load_settings(path: Option<&Path>) -> Result<ClientSettings> {
    load_with_environment(path, Environment::default())
}

fn load_with_environment(path: Option<&Path>, environment: Environment) -> Result<ClientSettings> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }

    let config = builder.add_source(environment).build().map_err(|err| ClientError::Config(err.to_string()))?;

    from_config(config)
}

fn from_config(config: Config) -> Result<ClientSettings> {
    config.try_deserialize().map_err(|err| ClientError::Config(err.to_string()))
}

#[cfg(test)]
mod tests {
    use config::FileFormat;
    use config::Map;

    use super::*;

    fn parse(toml: &str) -> Result<ClientSettings> {
        let config = Config::builder().add_source(File::from_str(toml, FileFormat::Toml)).build().unwrap();
        from_config(config)
    }

    #[test]
    fn test_defaults() {
        let settings = parse("").unwrap();
        assert!(settings.base_url.is_empty());
        assert!(!settings.api_sandbox);
        assert_eq!(settings.retry_count, 0);
        assert_eq!(settings.secret_encoding, SecretEncoding::Base64);
    }

    #[test]
    fn test_full_file() {
        let settings = parse(
            r#"
            base_url = "https://api.exchange.test"
            api_key = "k"
            api_secret = "c2VjcmV0"
            api_passphrase = "p"
            api_sandbox = true
            retry_count = 3
            secret_encoding = "raw"
            "#,
        )
        .unwrap();

        assert_eq!(settings.base_url, "https://api.exchange.test");
        assert_eq!(settings.credentials(), Credentials::new("k", "c2VjcmV0", "p"));
        assert!(settings.api_sandbox);
        assert_eq!(settings.retry_count, 3);
        assert_eq!(settings.secret_encoding, SecretEncoding::Raw);
    }

    fn environment(vars: &[(&str, &str)]) -> Environment {
        let vars: Map<String, String> = vars.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect();
        Environment::default().source(Some(vars))
    }

    #[test]
    fn test_environment_variables() {
        let env = environment(&[
            ("BASE_URL", "https://api.exchange.test"),
            ("API_KEY", "k"),
            ("API_SECRET", "c2VjcmV0"),
            ("API_PASSPHRASE", "p"),
            ("API_SANDBOX", "1"),
            ("RETRY_COUNT", "2"),
            ("SECRET_ENCODING", "raw"),
        ]);

        let settings = load_with_environment(None, env).unwrap();

        assert_eq!(settings.base_url, "https://api.exchange.test");
        assert_eq!(settings.credentials(), Credentials::new("k", "c2VjcmV0", "p"));
        assert!(settings.api_sandbox);
        assert_eq!(settings.retry_count, 2);
        assert_eq!(settings.secret_encoding, SecretEncoding::Raw);
    }

    #[test]
    fn test_sandbox_flag_other_than_one() {
        let settings = load_with_environment(None, environment(&[("API_SANDBOX", "0")])).unwrap();
        assert!(!settings.api_sandbox);
    }

    #[test]
    fn test_environment_overrides_file() {
        let path = std::env::temp_dir().join(format!("xc_http_settings_{}.toml", std::process::id()));
        std::fs::write(&path, "base_url = \"https://file.test\"\napi_key = \"file-key\"\nretry_count = 5\n").unwrap();

        let env = environment(&[("BASE_URL", "https://env.test"), ("RETRY_COUNT", "1")]);
        let result = load_with_environment(Some(path.as_path()), env);
        std::fs::remove_file(&path).unwrap();

        let settings = result.unwrap();
        assert_eq!(settings.base_url, "https://env.test");
        assert_eq!(settings.api_key, "file-key");
        assert_eq!(settings.retry_count, 1);
    }

    #[test]
    fn test_unparsable_retry_count_from_environment() {
        let result = load_with_environment(None, environment(&[("RETRY_COUNT", "many")]));
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_invalid_retry_count() {
        let result = parse("retry_count = -1");
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_debug_hides_secret() {
        let settings = parse(r#"api_secret = "super-secret""#).unwrap();
        assert!(!format!("{settings:?}").contains("super-secret"));
    }
}
