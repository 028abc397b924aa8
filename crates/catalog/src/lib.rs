//! Хранилище каталога модулей, доменов и артефактов.
//!
//! Снапшот графа раскладывается по таблицам встроенного SQLite и
//! собирается обратно при чтении. Запись - полная замена в одной транзакции.
//!
//! # Пример
//! ```no_run
//! use catalog::{InitializeOptions, SnapshotStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut store = SnapshotStore::new();
//!     store.initialize(InitializeOptions::at_path("data/catalog.sqlite")).await?;
//!
//!     let mut snapshot = store.load_snapshot()?;
//!     snapshot.modules.retain(|m| m.id != "legacy-billing");
//!     store.persist_snapshot(&snapshot)?;
//!
//!     store.close();
//!     Ok(())
//! }
//! ```

pub mod domain_tree;
pub mod errors;
pub mod layout;
pub mod links;
pub mod schema;
pub mod seed;
pub mod store;
pub mod types;

pub use domain_tree::{flatten_domain_tree, rebuild_domain_tree, DomainRow};
pub use errors::{StoreError, StoreResult};
pub use layout::{normalize_layout, normalize_layout_value};
pub use links::{derive_links, GraphLink, LinkKind};
pub use seed::initial_snapshot;
pub use store::{
    is_valid_snapshot_shape, InitializeOptions, Resolved, SnapshotStore, DEFAULT_DATABASE_PATH,
};
pub use types::*;
