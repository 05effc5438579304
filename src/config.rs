//! RPC endpoint configuration: validated base URL, credentials, and schema selection.

// self
use crate::{_prelude::*, error::ConfigError};

const ENV_URL: &str = "SUPABASE_URL";
const ENV_URL_PUBLIC: &str = "NEXT_PUBLIC_SUPABASE_URL";
const ENV_SERVICE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
const ENV_ANON_KEY: &str = "SUPABASE_ANON_KEY";
const ENV_SCHEMA: &str = "SUPABASE_SCHEMA";

/// Redacted API key wrapper keeping credentials out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey(String);
impl ApiKey {
	/// Wraps a new key string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner key. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for ApiKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ApiKey").field(&"<redacted>").finish()
	}
}
impl Display for ApiKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Immutable endpoint configuration consumed by RPC clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcConfig {
	/// Project base URL, always ending in `/`.
	pub base_url: Url,
	/// Key sent in the `apikey` header.
	pub api_key: ApiKey,
	/// Bearer token sent in `Authorization`; falls back to the API key.
	pub access_token: Option<ApiKey>,
	/// Postgres schema selected via `Content-Profile`.
	pub schema: Option<String>,
}
impl RpcConfig {
	/// Creates a new builder for the provided base URL.
	pub fn builder(base_url: Url) -> RpcConfigBuilder {
		RpcConfigBuilder::new(base_url)
	}

	/// Loads configuration from the process environment.
	///
	/// Reads `SUPABASE_URL` (or `NEXT_PUBLIC_SUPABASE_URL`), `SUPABASE_SERVICE_ROLE_KEY` (or
	/// `SUPABASE_ANON_KEY`), and the optional `SUPABASE_SCHEMA`.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads configuration through an arbitrary variable lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let url = first_set(&lookup, &[ENV_URL, ENV_URL_PUBLIC])
			.ok_or(ConfigError::MissingEnv { name: ENV_URL })?;
		let key = first_set(&lookup, &[ENV_SERVICE_KEY, ENV_ANON_KEY])
			.ok_or(ConfigError::MissingEnv { name: ENV_SERVICE_KEY })?;
		let mut builder = Self::builder(Url::parse(url.trim())?).api_key(key.trim());

		if let Some(schema) = first_set(&lookup, &[ENV_SCHEMA]) {
			builder = builder.schema(schema.trim());
		}

		builder.build()
	}

	/// Resolves the endpoint for a named procedure.
	pub fn procedure_url(&self, procedure: &str) -> Result<Url, ConfigError> {
		Ok(self.base_url.join("rest/v1/rpc/")?.join(procedure)?)
	}

	/// Returns the bearer token applied to every request.
	pub fn bearer(&self) -> &ApiKey {
		self.access_token.as_ref().unwrap_or(&self.api_key)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		let url = &self.base_url;

		match url.scheme() {
			"https" => {},
			"http" if is_loopback(url) => {},
			_ => return Err(ConfigError::InsecureEndpoint { url: url.to_string() }),
		}

		if url.query().is_some() || url.fragment().is_some() || url.cannot_be_a_base() {
			return Err(ConfigError::EndpointNotBase { url: url.to_string() });
		}
		if self.api_key.expose().trim().is_empty() {
			return Err(ConfigError::MissingApiKey);
		}
		if self.schema.as_deref().is_some_and(|schema| schema.trim().is_empty()) {
			return Err(ConfigError::InvalidSchema);
		}

		Ok(())
	}
}

/// Builder for [`RpcConfig`] values.
#[derive(Debug)]
pub struct RpcConfigBuilder {
	base_url: Url,
	api_key: Option<ApiKey>,
	access_token: Option<ApiKey>,
	schema: Option<String>,
}
impl RpcConfigBuilder {
	/// Creates a new builder seeded with the provided base URL.
	pub fn new(base_url: Url) -> Self {
		Self { base_url, api_key: None, access_token: None, schema: None }
	}

	/// Sets the API key.
	pub fn api_key(mut self, key: impl Into<String>) -> Self {
		self.api_key = Some(ApiKey::new(key));

		self
	}

	/// Sets a user access token used instead of the API key for `Authorization`.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(ApiKey::new(token));

		self
	}

	/// Selects a non-default Postgres schema.
	pub fn schema(mut self, schema: impl Into<String>) -> Self {
		self.schema = Some(schema.into());

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<RpcConfig, ConfigError> {
		let mut base_url = self.base_url;

		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());

			base_url.set_path(&path);
		}

		let config = RpcConfig {
			base_url,
			api_key: self.api_key.ok_or(ConfigError::MissingApiKey)?,
			access_token: self.access_token,
			schema: self.schema,
		};

		config.validate()?;

		Ok(config)
	}
}

fn first_set<F>(lookup: &F, names: &[&str]) -> Option<String>
where
	F: Fn(&str) -> Option<String>,
{
	names.iter().find_map(|&name| lookup(name).filter(|value| !value.trim().is_empty()))
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain == "localhost",
		Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
		Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}
