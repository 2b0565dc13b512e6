// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! meshlog Persistence
//!
//! Durable [`Storage`](meshlog::Storage) backends for host builds of the
//! data log server, so that remotely configured properties survive a
//! restart.
//!
//! # Example
//!
//! ```ignore
//! use meshlog::PropertiesStore;
//! use meshlog_persistence::SqliteStorage;
//!
//! let storage = SqliteStorage::new("meshlog.db")?;
//! let store = PropertiesStore::new(storage);
//! let server = LogServer::new(config, transport, scheduler, store, sensor)?;
//! ```

pub mod sqlite;

pub use sqlite::SqliteStorage;
