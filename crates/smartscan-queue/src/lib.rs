// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SmartScan Queue — the message transport used to publish rendered documents
// and runtime settings.  Channels are created on demand, receives are
// bounded, and every delivery stays locked until it is completed.

pub mod integrity;
pub mod memory;
pub mod sqlite;
pub mod transport;

pub use integrity::{hash_bytes, verify_hash};
pub use memory::MemoryTransport;
pub use sqlite::SqliteTransport;
pub use transport::{Delivery, MessageTransport};
