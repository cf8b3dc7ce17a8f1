//! Relay transport and relay pool: the layer `nostr-sync` drives to talk to
//! real relays (spec.md §4.1, §4.2).

pub mod auth;
pub mod config;
pub mod error;
pub mod pool;
pub mod relay;
pub mod subscription;

pub use auth::{AuthPolicy, Signer, auth_template};
pub use config::{PoolConfig, RelayConfig};
pub use error::{ClientError, Result};
pub use pool::{BatchResult, BatchSubscription, PoolStats, RelayCompletion, RelayPool};
pub use relay::{ConnectionState, PublishConfirmation, RelayConnection};
pub use subscription::{Subscription, SubscriptionCompletion};
