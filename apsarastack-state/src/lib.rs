//! ApsaraStack State Management
//!
//! Persists what the provider created so later runs can refresh, update
//! and destroy it.
//!
//! # Overview
//!
//! - **StateFile**: every managed resource with its cloud-side identifier
//! - **StateBackend**: storage for state files and their locks
//! - **LockInfo**: who holds the state and until when
//!
//! # Example
//!
//! ```ignore
//! use apsarastack_state::{LocalBackend, StateBackend};
//!
//! let backend = LocalBackend::new();
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//!
//! // ... apply changes ...
//!
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

// Re-export main types for convenience
pub use backend::{BackendError, BackendResult, StateBackend};
pub use backends::LocalBackend;
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
