/*
 * Responsibility
 * - 環境変数 (ELASTAUTH_*) の読み込み
 * - 設定値のバリデーション (不足・不正なら起動失敗)
 * - テストからは from_lookup() で環境変数に触れずに組み立てる
 */
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

const PREFIX: &str = "ELASTAUTH_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: Option<String>) -> Self {
        match raw
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}{}", PREFIX, key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}{}", PREFIX, key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Request pipeline mode, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    AuthOnly,
    Proxy,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::AuthOnly => "auth-only",
            Mode::Proxy => "proxy",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeaderNames {
    pub username: String,
    pub groups: String,
    pub email: String,
    pub full_name: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            username: "Remote-User".to_string(),
            groups: "Remote-Groups".to_string(),
            email: "Remote-Email".to_string(),
            full_name: "Remote-Name".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValidation {
    Jwks,
    Userinfo,
    Both,
}

impl TokenValidation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenValidation::Jwks => "jwks",
            TokenValidation::Userinfo => "userinfo",
            TokenValidation::Both => "both",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClaimMappings {
    pub username: String,
    pub email: String,
    pub groups: String,
    pub full_name: String,
}

impl Default for ClaimMappings {
    fn default() -> Self {
        Self {
            username: "preferred_username".to_string(),
            email: "email".to_string(),
            groups: "groups".to_string(),
            full_name: "name".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct OidcConfig {
    pub issuer: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub jwks_uri: Option<Url>,
    pub userinfo_endpoint: Option<Url>,
    pub token_validation: TokenValidation,
    pub token_cookie: String,
    pub claims: ClaimMappings,
    pub custom_headers: BTreeMap<String, String>,
    pub jwks_cache_ttl: Duration,
    pub http_timeout: Duration,
}

impl fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcConfig")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("token_validation", &self.token_validation)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum AuthProviderConfig {
    Authelia(HeaderNames),
    Oidc(OidcConfig),
}

impl AuthProviderConfig {
    pub fn name(&self) -> &'static str {
        match self {
            AuthProviderConfig::Authelia(_) => "authelia",
            AuthProviderConfig::Oidc(_) => "oidc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Memory,
    Redis,
    File,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Memory => "memory",
            CacheKind::Redis => "redis",
            CacheKind::File => "file",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub kind: CacheKind,
    pub ttl: Duration,
    pub key_prefix: String,
    pub refresh_threshold: f64,
    pub redis_host: String,
    pub redis_db: u32,
    pub file_dir: PathBuf,
}

impl CacheConfig {
    pub fn redis_url(&self) -> String {
        format!("redis://{}/{}", self.redis_host, self.redis_db)
    }
}

#[derive(Clone)]
pub struct ElasticsearchConfig {
    pub hosts: Vec<Url>,
    pub username: String,
    pub password: String,
    pub dry_run: bool,
    pub timeout: Duration,
}

impl fmt::Debug for ElasticsearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElasticsearchConfig")
            .field(
                "hosts",
                &self.hosts.iter().map(Url::as_str).collect::<Vec<_>>(),
            )
            .field("username", &self.username)
            .field("password", &"***")
            .field("dry_run", &self.dry_run)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub attempts: u32,
    pub backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct RoleConfig {
    pub group_mappings: BTreeMap<String, Vec<String>>,
    pub default_roles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub target: Option<Url>,
    pub timeout: Duration,
    pub max_idle_conns: usize,
    pub idle_conn_timeout: Duration,
    pub insecure_skip_verify: bool,
    pub ca_cert: Option<PathBuf>,
}

#[derive(Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub log_level: String,
    pub log_format: LogFormat,

    pub auth: AuthProviderConfig,
    pub cache: CacheConfig,
    pub secret_key: Option<String>,
    pub elasticsearch: ElasticsearchConfig,
    pub retry: RetryConfig,
    pub roles: RoleConfig,
    /// Groups a principal may carry; any other group is rejected. `None` disables the check.
    pub group_whitelist: Option<BTreeSet<String>>,
    pub proxy: ProxyConfig,

    pub request_body_limit: usize,
    pub metrics_enabled: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("app_env", &self.app_env)
            .field("auth", &self.auth)
            .field("cache", &self.cache)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("elasticsearch", &self.elasticsearch)
            .field("group_whitelist", &self.group_whitelist)
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

/// Reads prefixed keys through an arbitrary lookup; blank values count as unset.
struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &'static str) -> Option<String> {
        (self.lookup)(&format!("{PREFIX}{key}"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn string_or(&self, key: &'static str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid(key)),
            None => Ok(default),
        }
    }

    fn bool_or(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid(key)),
            },
        }
    }

    fn duration_or(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        match self.get(key) {
            Some(v) => parse_duration(&v).ok_or(ConfigError::Invalid(key)),
            None => Ok(default),
        }
    }

    fn url(&self, key: &'static str) -> Result<Option<Url>, ConfigError> {
        self.get(key)
            .map(|v| Url::parse(&v).map_err(|_| ConfigError::Invalid(key)))
            .transpose()
    }

    fn list(&self, key: &'static str) -> Vec<String> {
        self.get(key)
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn json_or<T: serde::de::DeserializeOwned>(
        &self,
        key: &'static str,
        default: T,
    ) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(v) => serde_json::from_str(&v).map_err(|_| ConfigError::Invalid(key)),
            None => Ok(default),
        }
    }
}

/// Parses `250ms`, `30s`, `5m`, `1h` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let n: u64 = digits.parse().ok()?;

    match unit.trim() {
        "" | "s" => Some(Duration::from_secs(n)),
        "ms" => Some(Duration::from_millis(n)),
        "m" => Some(Duration::from_secs(n.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(n.checked_mul(3600)?)),
        _ => None,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let addr: SocketAddr = env.parse_or("LISTEN", SocketAddr::from(([127, 0, 0, 1], 5000)))?;
        let app_env = AppEnv::parse(env.get("APP_ENV"));
        let log_level = env.string_or("LOG_LEVEL", "info");
        let log_format = match env.string_or("LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "text" => LogFormat::Text,
            _ => return Err(ConfigError::Invalid("LOG_FORMAT")),
        };

        let auth = match env.string_or("AUTH_PROVIDER", "authelia").to_ascii_lowercase().as_str() {
            "authelia" => AuthProviderConfig::Authelia(load_header_names(&env)),
            "oidc" => AuthProviderConfig::Oidc(load_oidc(&env)?),
            _ => return Err(ConfigError::Invalid("AUTH_PROVIDER")),
        };

        let cache = load_cache(&env)?;
        let secret_key = env.get("SECRET_KEY");

        let hosts = env
            .list("ELASTICSEARCH_HOSTS")
            .into_iter()
            .map(|h| Url::parse(&h).map_err(|_| ConfigError::Invalid("ELASTICSEARCH_HOSTS")))
            .collect::<Result<Vec<_>, _>>()?;
        if hosts.is_empty() {
            return Err(ConfigError::Missing("ELASTICSEARCH_HOSTS"));
        }
        let elasticsearch = ElasticsearchConfig {
            hosts,
            username: env.required("ELASTICSEARCH_USERNAME")?,
            password: env.required("ELASTICSEARCH_PASSWORD")?,
            dry_run: env.bool_or("ELASTICSEARCH_DRY_RUN", false)?,
            timeout: env.duration_or("ELASTICSEARCH_TIMEOUT", Duration::from_secs(10))?,
        };

        let retry = RetryConfig {
            attempts: env.parse_or("BACKEND_RETRY_ATTEMPTS", 3u32)?.max(1),
            backoff: Duration::from_millis(env.parse_or("BACKEND_RETRY_BACKOFF_MS", 100u64)?),
        };

        let mut default_roles = env.list("DEFAULT_ROLES");
        if default_roles.is_empty() {
            default_roles.push("kibana_user".to_string());
        }
        let roles = RoleConfig {
            group_mappings: env.json_or("GROUP_MAPPINGS", BTreeMap::new())?,
            default_roles,
        };

        let group_whitelist = env
            .bool_or("ENABLE_GROUP_WHITELIST", false)?
            .then(|| env.list("GROUP_WHITELIST").into_iter().collect::<BTreeSet<_>>());

        let proxy = ProxyConfig {
            enabled: env.bool_or("PROXY_ENABLED", false)?,
            target: env.url("PROXY_TARGET")?,
            timeout: env.duration_or("PROXY_TIMEOUT", Duration::from_secs(30))?,
            max_idle_conns: env.parse_or("PROXY_MAX_IDLE_CONNS", 100usize)?,
            idle_conn_timeout: env.duration_or("PROXY_IDLE_CONN_TIMEOUT", Duration::from_secs(90))?,
            insecure_skip_verify: env.bool_or("PROXY_TLS_INSECURE_SKIP_VERIFY", false)?,
            ca_cert: env.get("PROXY_TLS_CA_CERT").map(PathBuf::from),
        };

        Ok(Self {
            addr,
            app_env,
            log_level,
            log_format,
            auth,
            cache,
            secret_key,
            elasticsearch,
            retry,
            roles,
            group_whitelist,
            proxy,
            request_body_limit: env.parse_or("REQUEST_BODY_LIMIT", 10 * 1024 * 1024)?,
            metrics_enabled: env.bool_or("METRICS_ENABLED", false)?,
        })
    }

    pub fn mode(&self) -> Mode {
        if self.proxy.enabled {
            Mode::Proxy
        } else {
            Mode::AuthOnly
        }
    }

    /// Origin that proxied requests are sent to.
    pub fn proxy_target(&self) -> &Url {
        self.proxy
            .target
            .as_ref()
            .unwrap_or(&self.elasticsearch.hosts[0])
    }
}

fn load_header_names<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> HeaderNames {
    let d = HeaderNames::default();
    HeaderNames {
        username: env.string_or("HEADERS_USERNAME", &d.username),
        groups: env.string_or("HEADERS_GROUPS", &d.groups),
        email: env.string_or("HEADERS_EMAIL", &d.email),
        full_name: env.string_or("HEADERS_NAME", &d.full_name),
    }
}

fn load_oidc<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<OidcConfig, ConfigError> {
    let token_validation = match env.string_or("OIDC_TOKEN_VALIDATION", "jwks").to_ascii_lowercase().as_str() {
        "jwks" => TokenValidation::Jwks,
        "userinfo" => TokenValidation::Userinfo,
        "both" => TokenValidation::Both,
        _ => return Err(ConfigError::Invalid("OIDC_TOKEN_VALIDATION")),
    };

    let d = ClaimMappings::default();
    let claims = ClaimMappings {
        username: env.string_or("OIDC_CLAIM_USERNAME", &d.username),
        email: env.string_or("OIDC_CLAIM_EMAIL", &d.email),
        groups: env.string_or("OIDC_CLAIM_GROUPS", &d.groups),
        full_name: env.string_or("OIDC_CLAIM_FULL_NAME", &d.full_name),
    };

    let oidc = OidcConfig {
        issuer: env
            .url("OIDC_ISSUER")?
            .and(env.get("OIDC_ISSUER"))
            .map(|iss| iss.trim_end_matches('/').to_string()),
        client_id: env.get("OIDC_CLIENT_ID"),
        client_secret: env.get("OIDC_CLIENT_SECRET"),
        jwks_uri: env.url("OIDC_JWKS_URI")?,
        userinfo_endpoint: env.url("OIDC_USERINFO_ENDPOINT")?,
        token_validation,
        token_cookie: env.string_or("OIDC_TOKEN_COOKIE", "access_token"),
        claims,
        custom_headers: env.json_or("OIDC_CUSTOM_HEADERS", BTreeMap::new())?,
        jwks_cache_ttl: env.duration_or("OIDC_JWKS_CACHE_TTL", Duration::from_secs(3600))?,
        http_timeout: env.duration_or("OIDC_TIMEOUT", Duration::from_secs(10))?,
    };

    // Without an issuer every endpoint the chosen validation needs must be explicit.
    if oidc.issuer.is_none() {
        let needs_jwks = token_validation != TokenValidation::Userinfo;
        let needs_userinfo = token_validation != TokenValidation::Jwks;
        if needs_jwks && oidc.jwks_uri.is_none() {
            return Err(ConfigError::Missing("OIDC_ISSUER"));
        }
        if needs_userinfo && oidc.userinfo_endpoint.is_none() {
            return Err(ConfigError::Missing("OIDC_USERINFO_ENDPOINT"));
        }
    }

    Ok(oidc)
}

fn load_cache<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<CacheConfig, ConfigError> {
    let kind = match env.string_or("CACHE_TYPE", "memory").to_ascii_lowercase().as_str() {
        "memory" => CacheKind::Memory,
        "redis" | "valkey" => CacheKind::Redis,
        "file" => CacheKind::File,
        _ => return Err(ConfigError::Invalid("CACHE_TYPE")),
    };

    let ttl = env.duration_or("CACHE_EXPIRATION", Duration::from_secs(3600))?;
    if ttl.is_zero() {
        return Err(ConfigError::Invalid("CACHE_EXPIRATION"));
    }

    let refresh_threshold: f64 = env.parse_or("CACHE_REFRESH_THRESHOLD", 0.5)?;
    if !(refresh_threshold > 0.0 && refresh_threshold <= 1.0) {
        return Err(ConfigError::Invalid("CACHE_REFRESH_THRESHOLD"));
    }

    Ok(CacheConfig {
        kind,
        ttl,
        key_prefix: env.string_or("CACHE_KEY_PREFIX", "elastauth"),
        refresh_threshold,
        redis_host: env.string_or("REDIS_HOST", "localhost:6379"),
        redis_db: env.parse_or("REDIS_DB", 0u32)?,
        file_dir: PathBuf::from(env.string_or("CACHE_FILE_DIR", "./elastauth-cache")),
    })
}
