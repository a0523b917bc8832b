//! Event streams for the back-office runtime.
//!
//! Stream contracts hand their connection to the [`FanoutRegistry`], which
//! owns every open [`StreamClient`] and delivers [`ApiEvent`]s to them as
//! event-stream frames:
//!
//! ```text
//! data: {"kind":"store_status_changed","payload":{"store_id":3,"status":{...}}}
//!
//! ```
//!
//! ## Example
//!
//! ```rust
//! use backoffice_core::ApiEvent;
//! use backoffice_sse::{FanoutRegistry, StreamConfig};
//!
//! # tokio_test::block_on(async {
//! let registry = FanoutRegistry::new(StreamConfig::new().without_keep_alive());
//! let (id, _stream) = registry.connect(Some(3), &[]).unwrap();
//!
//! let delivery = registry.publish_scoped(&ApiEvent::AnnouncementRead {
//!     store_id: 3,
//!     announcement_id: 9,
//! });
//! assert_eq!(delivery.delivered, 1);
//! assert!(registry.contains(&id));
//! # });
//! ```

mod config;
mod error;
mod frame;
mod registry;
mod stream;

pub use backoffice_core::ApiEvent;
pub use config::StreamConfig;
pub use error::{SseError, SseResult};
pub use frame::{SseFrame, SseItem};
pub use registry::{ConnectionId, Delivery, FanoutRegistry, StreamClient};
pub use stream::{stream_headers, SseSender, SseStream};
