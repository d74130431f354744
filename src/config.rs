use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::queue::QueueSettings;
use crate::retry::{BackoffStrategy, RetryPolicy};
use crate::utils::constants::{DEFAULT_QUEUE_NAME, DEFAULT_QUEUE_PREFIX, DEFAULT_RECORD_PREFIX};

/// A string that never shows up in `Debug` output or logs.
#[derive(Clone, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub server: String,
    pub port: u16,
    pub use_tls: bool,
    pub username: String,
    pub password: Secret,
    /// From address; defaults to the username.
    pub sender: String,
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub broker_url: String,
    pub prefix: String,
    pub name: String,
    pub visibility_timeout: Duration,
    pub poll_interval: Duration,
    pub enqueue_timeout: Duration,
}

impl QueueConfig {
    pub fn settings(&self) -> QueueSettings {
        QueueSettings::new(self.name.clone())
            .with_visibility_timeout(self.visibility_timeout)
            .with_poll_interval(self.poll_interval)
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub send_timeout: Duration,
    /// Upper bound for one idle long-poll; also how quickly a worker notices shutdown.
    pub dequeue_wait: Duration,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub redis_url: String,
    /// Bound on connecting to Redis and on every command.
    pub redis_timeout: Duration,
    pub record_prefix: String,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub mail: MailConfig,
    pub host: String,
    pub port: u16,
    pub log_format: String,
}

impl AppConfig {
    /// Process environment, falling back to a `.env` file in the working
    /// directory when there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = Path::new(".env");
        if path.is_file() {
            Self::from_env_file(path)
        } else {
            Self::from_lookup(|key| std::env::var(key).ok())
        }
    }

    /// Like [`AppConfig::from_env`] with an explicit dotenv file. Variables
    /// already set in the process win over the file.
    pub fn from_env_file(path: &Path) -> Result<Self, ConfigError> {
        let entries = dotenv::from_path_iter(path).map_err(|err| ConfigError::Invalid {
            key: "DOTENV",
            value: format!("{}: {err}", path.display()),
        })?;
        let mut file = HashMap::new();
        for entry in entries {
            let (key, value) = entry.map_err(|err| ConfigError::Invalid {
                key: "DOTENV",
                value: format!("{}: {err}", path.display()),
            })?;
            file.insert(key, value);
        }
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| file.get(key).cloned()))
    }

    /// Builds the configuration from any key lookup, applying defaults for
    /// missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let redis_url = env.string("REDIS_URL", "redis://127.0.0.1:6379/0");
        let broker_url = env.string("BROKER_URL", &redis_url);
        let username = env.string("MAIL_USERNAME", "");
        let sender = env.string("MAIL_SENDER", &username);

        let config = Self {
            record_prefix: env.string("RECORD_PREFIX", DEFAULT_RECORD_PREFIX),
            queue: QueueConfig {
                broker_url,
                prefix: env.string("QUEUE_PREFIX", DEFAULT_QUEUE_PREFIX),
                name: env.string("QUEUE_NAME", DEFAULT_QUEUE_NAME),
                visibility_timeout: Duration::from_secs(env.parse("VISIBILITY_TIMEOUT_SECS", 60)?),
                poll_interval: Duration::from_millis(env.parse("POLL_INTERVAL_MS", 500)?),
                enqueue_timeout: Duration::from_millis(env.parse("ENQUEUE_TIMEOUT_MS", 2000)?),
            },
            worker: WorkerConfig {
                concurrency: env.parse("WORKER_CONCURRENCY", 2)?,
                retry: RetryPolicy {
                    max_attempts: env.parse("MAX_ATTEMPTS", 5)?,
                    base_delay: Duration::from_millis(env.parse("RETRY_BASE_DELAY_MS", 1000)?),
                    max_delay: Duration::from_millis(env.parse("RETRY_MAX_DELAY_MS", 60_000)?),
                    strategy: env.parse("RETRY_STRATEGY", BackoffStrategy::Exponential)?,
                },
                send_timeout: Duration::from_secs(env.parse("SEND_TIMEOUT_SECS", 30)?),
                dequeue_wait: Duration::from_millis(env.parse("DEQUEUE_WAIT_MS", 5000)?),
            },
            mail: MailConfig {
                server: env.string("MAIL_SERVER", "smtp.gmail.com"),
                port: env.parse("MAIL_PORT", 587)?,
                use_tls: env.flag("MAIL_USE_TLS", true)?,
                username,
                password: Secret::new(env.string("MAIL_PASSWORD", "")),
                sender,
            },
            host: env.string("HOST", "0.0.0.0"),
            port: env.parse("PORT", 5000)?,
            log_format: env.string("LOG_FORMAT", "pretty"),
            redis_timeout: Duration::from_millis(env.parse("REDIS_TIMEOUT_MS", 3000)?),
            redis_url,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKER_CONCURRENCY",
                value: "0".to_string(),
            });
        }
        if self.redis_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "REDIS_TIMEOUT_MS",
                value: "0".to_string(),
            });
        }
        if self.worker.send_timeout >= self.queue.visibility_timeout {
            return Err(ConfigError::Inconsistent(format!(
                "SEND_TIMEOUT_SECS ({:?}) must be shorter than VISIBILITY_TIMEOUT_SECS ({:?})",
                self.worker.send_timeout, self.queue.visibility_timeout
            )));
        }
        Ok(())
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str, default: &str) -> String {
        (self.0)(key)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match (self.0)(key) {
            Some(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value: raw }),
            _ => Ok(default),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match (self.0)(key).map(|raw| raw.trim().to_ascii_lowercase()) {
            None => Ok(default),
            Some(raw) => match raw.as_str() {
                "" => Ok(default),
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid { key, value: raw }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_share_one_redis_for_store_and_broker() {
        let config = config_from(&[("REDIS_URL", "redis://keydb:6379/0")]).unwrap();
        assert_eq!(config.queue.broker_url, "redis://keydb:6379/0");
        assert_eq!(config.record_prefix, "receta:");
        assert_eq!(config.mail.port, 587);
        assert!(config.mail.use_tls);
        assert_eq!(config.port, 5000);
        assert_eq!(config.worker.retry.max_attempts, 5);
        assert_eq!(config.worker.retry.strategy, BackoffStrategy::Exponential);
        assert_eq!(config.worker.dequeue_wait, Duration::from_secs(5));
        assert_eq!(config.redis_timeout, Duration::from_secs(3));
    }

    #[test]
    fn backoff_strategy_and_waits_are_configurable() {
        let config = config_from(&[
            ("RETRY_STRATEGY", "Linear"),
            ("DEQUEUE_WAIT_MS", "250"),
            ("REDIS_TIMEOUT_MS", "800"),
        ])
        .unwrap();
        assert_eq!(config.worker.retry.strategy, BackoffStrategy::Linear);
        assert_eq!(
            config.worker.retry.delay_for_attempt(3),
            Duration::from_secs(3)
        );
        assert_eq!(config.worker.dequeue_wait, Duration::from_millis(250));
        assert_eq!(config.redis_timeout, Duration::from_millis(800));

        assert!(matches!(
            config_from(&[("RETRY_STRATEGY", "random")]),
            Err(ConfigError::Invalid { key: "RETRY_STRATEGY", .. })
        ));
        assert!(matches!(
            config_from(&[("REDIS_TIMEOUT_MS", "0")]),
            Err(ConfigError::Invalid { key: "REDIS_TIMEOUT_MS", .. })
        ));
    }

    #[test]
    fn sender_defaults_to_username() {
        let config = config_from(&[("MAIL_USERNAME", "tu_correo@gmail.com")]).unwrap();
        assert_eq!(config.mail.sender, "tu_correo@gmail.com");
    }

    #[test]
    fn password_is_redacted() {
        let config = config_from(&[("MAIL_PASSWORD", "hunter2")]).unwrap();
        assert!(!format!("{:?}", config.mail).contains("hunter2"));
        assert_eq!(config.mail.password.expose(), "hunter2");
    }

    #[test]
    fn rejects_bad_numbers_and_flags() {
        assert!(matches!(
            config_from(&[("MAIL_PORT", "smtp")]),
            Err(ConfigError::Invalid { key: "MAIL_PORT", .. })
        ));
        assert!(matches!(
            config_from(&[("MAIL_USE_TLS", "maybe")]),
            Err(ConfigError::Invalid { key: "MAIL_USE_TLS", .. })
        ));
    }

    #[test]
    fn send_timeout_must_fit_in_visibility_timeout() {
        let err = config_from(&[("VISIBILITY_TIMEOUT_SECS", "10"), ("SEND_TIMEOUT_SECS", "10")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Inconsistent(_)));
    }

    #[test]
    fn dotenv_file_fills_unset_variables() {
        let path = std::env::temp_dir().join(format!("recetario-{}.env", nanoid::nanoid!(8)));
        std::fs::write(
            &path,
            "MAIL_USERNAME=tu_correo@gmail.com\nMAIL_PASSWORD=\"app password\"\nRECETARIO_UNUSED=1\n",
        )
        .unwrap();

        let config = AppConfig::from_env_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.mail.sender, "tu_correo@gmail.com");
        assert_eq!(config.mail.password.expose(), "app password");
    }

    #[test]
    fn missing_dotenv_file_is_reported() {
        let missing = std::env::temp_dir().join("recetario-does-not-exist.env");
        assert!(matches!(
            AppConfig::from_env_file(&missing),
            Err(ConfigError::Invalid { key: "DOTENV", .. })
        ));
    }
}
