//! RPC-backed transactions with manual commit/rollback hooks, plus an in-memory
//! fixed-window rate limiter, for services that talk to a PostgREST/Supabase backend.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod error;
pub mod obs;
pub mod rate_limit;
pub mod rpc;
pub mod transaction;

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use serde_json;
pub use time;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
