//! Remote procedure surface for PostgREST-style backends.
//!
//! The module exposes [`RpcClient`], the crate's only dependency on a transport. The
//! transaction runner drives `begin_transaction`, `commit_transaction`, and
//! `rollback_transaction` through it, and operations may issue their own procedures via
//! the same client. [`decode_response`] turns a raw status + body pair into a JSON value or
//! an [`RpcError`] so custom transports classify failures the same way the built-in
//! reqwest client does.

// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::ACCEPT;
use serde_json::Value;
// self
#[cfg(feature = "reqwest")] use crate::config::RpcConfig;
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
	obs::{self, RpcOutcome},
};

/// Boxed future returned by [`RpcClient::call`].
pub type RpcFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, RpcError>> + 'a + Send>>;

/// Transport capable of invoking named remote procedures.
///
/// Implementations must be `Send + Sync` so one client can be shared across runners
/// behind an `Arc<dyn RpcClient>`.
pub trait RpcClient
where
	Self: Send + Sync,
{
	/// Invokes `procedure` with a JSON parameter object and returns its JSON result.
	fn call<'a>(&'a self, procedure: &'a str, params: &'a Value) -> RpcFuture<'a>;
}

/// Transaction-control procedures exposed by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Procedure {
	/// Opens a transaction.
	BeginTransaction,
	/// Persists the open transaction.
	CommitTransaction,
	/// Discards the open transaction.
	RollbackTransaction,
}
impl Procedure {
	/// Returns the wire name of the procedure.
	pub const fn as_str(self) -> &'static str {
		match self {
			Procedure::BeginTransaction => "begin_transaction",
			Procedure::CommitTransaction => "commit_transaction",
			Procedure::RollbackTransaction => "rollback_transaction",
		}
	}
}
impl Display for Procedure {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Failures raised while invoking a remote procedure.
#[derive(Debug, ThisError)]
pub enum RpcError {
	/// Backend answered with a non-success status.
	#[error("Procedure `{procedure}` was rejected: {message}")]
	Rejected {
		/// Procedure name.
		procedure: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Postgres/PostgREST error code.
		code: Option<String>,
		/// Backend-supplied message, or the raw body when it is not structured.
		message: String,
		/// Additional backend detail.
		details: Option<Box<str>>,
		/// Backend hint.
		hint: Option<Box<str>>,
	},
	/// Backend answered with a success status but a malformed JSON body.
	#[error("Procedure `{procedure}` returned malformed JSON.")]
	Decode {
		/// Procedure name.
		procedure: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code.
		status: Option<u16>,
	},
	/// Procedure name contains characters outside `[A-Za-z0-9_]`.
	#[error("Procedure name `{procedure}` is invalid.")]
	InvalidProcedure {
		/// Rejected name.
		procedure: String,
	},
	/// Endpoint could not be resolved.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure.
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl RpcError {
	/// Returns the HTTP status associated with the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. } | Self::Decode { status, .. } => *status,
			_ => None,
		}
	}
}

/// PostgREST error payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorBody {
	/// Postgres/PostgREST error code.
	pub code: Option<String>,
	/// Error message.
	pub message: Option<String>,
	/// Additional detail.
	pub details: Option<String>,
	/// Hint for resolving the error.
	pub hint: Option<String>,
}

/// Ensures a procedure name is safe to embed in an endpoint path.
pub fn validate_procedure(procedure: &str) -> Result<(), RpcError> {
	if !procedure.is_empty()
		&& procedure.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
	{
		Ok(())
	} else {
		Err(RpcError::InvalidProcedure { procedure: procedure.into() })
	}
}

/// Classifies a raw response into a JSON value or an [`RpcError`].
///
/// Success statuses with an empty body decode to [`Value::Null`] (void procedures).
pub fn decode_response(procedure: &str, status: u16, body: &[u8]) -> Result<Value, RpcError> {
	if (200..300).contains(&status) {
		if body.iter().all(u8::is_ascii_whitespace) {
			return Ok(Value::Null);
		}

		let mut de = serde_json::Deserializer::from_slice(body);

		return serde_path_to_error::deserialize(&mut de).map_err(|source| RpcError::Decode {
			procedure: procedure.into(),
			source,
			status: Some(status),
		});
	}

	let parsed = serde_json::from_slice::<RpcErrorBody>(body)
		.ok()
		.filter(|payload| payload.message.is_some());
	let RpcErrorBody { code, message, details, hint } = parsed.unwrap_or_else(|| {
		let raw = String::from_utf8_lossy(body).trim().to_owned();

		RpcErrorBody { message: (!raw.is_empty()).then_some(raw), ..Default::default() }
	});

	Err(RpcError::Rejected {
		procedure: procedure.into(),
		status: Some(status),
		code,
		message: message.unwrap_or_else(|| format!("HTTP {status}")),
		details: details.map(String::into_boxed_str),
		hint: hint.map(String::into_boxed_str),
	})
}

/// Invokes a transaction-control procedure with empty parameters, recording metrics.
pub async fn call_procedure(client: &dyn RpcClient, procedure: Procedure) -> Result<(), RpcError> {
	let params = Value::Object(Default::default());

	obs::record_rpc_outcome(procedure, RpcOutcome::Attempt);

	match client.call(procedure.as_str(), &params).await {
		Ok(_) => {
			obs::record_rpc_outcome(procedure, RpcOutcome::Success);

			Ok(())
		},
		Err(e) => {
			obs::record_rpc_outcome(procedure, RpcOutcome::Failure);

			Err(e)
		},
	}
}

/// reqwest-backed [`RpcClient`] targeting `{base}/rest/v1/rpc/{procedure}`.
///
/// Every request carries the `apikey` header and an `Authorization: Bearer` header (the
/// access token when configured, otherwise the API key). A configured schema is selected
/// through `Content-Profile`.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestRpcClient {
	client: ReqwestClient,
	config: Arc<RpcConfig>,
}
#[cfg(feature = "reqwest")]
impl ReqwestRpcClient {
	/// Creates a client with a default reqwest [`ReqwestClient`].
	pub fn new(config: RpcConfig) -> Self {
		Self::with_client(ReqwestClient::default(), config)
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient, config: RpcConfig) -> Self {
		Self { client, config: Arc::new(config) }
	}

	/// Returns the endpoint configuration.
	pub fn config(&self) -> &RpcConfig {
		&self.config
	}
}
#[cfg(feature = "reqwest")]
impl RpcClient for ReqwestRpcClient {
	fn call<'a>(&'a self, procedure: &'a str, params: &'a Value) -> RpcFuture<'a> {
		Box::pin(async move {
			validate_procedure(procedure)?;

			let url = self.config.procedure_url(procedure)?;
			let mut request = self
				.client
				.post(url)
				.header("apikey", self.config.api_key.expose())
				.bearer_auth(self.config.bearer().expose())
				.header(ACCEPT, "application/json")
				.json(params);

			if let Some(schema) = self.config.schema.as_deref() {
				request = request.header("Content-Profile", schema);
			}

			let response = request.send().await.map_err(TransportError::from)?;
			let status = response.status().as_u16();
			let body = response.bytes().await.map_err(TransportError::from)?;

			decode_response(procedure, status, &body)
		})
	}
}
