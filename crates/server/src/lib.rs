//! HTTP фасад хранилища снапшотов графа.
//!
//! `GET /api/graph` отдаёт снапшот, `POST /api/graph` полностью заменяет его,
//! `GET /api/health` - проверка живости.

pub mod api;
pub mod config;

pub use api::{router, ApiError, ErrorBody, SharedStore, MAX_BODY_BYTES};
pub use config::{CliArgs, ConfigError, ConfigWarning, ServerConfig};
