//! Devtools gateway - discovery, namespacing, and session bridging
//!
//! Republishes debuggable targets from many backends under one proxy-owned address
//! space and bridges client sockets to the real backend endpoints:
//!
//! - **Backend adapters**: poll one `/json` listing, rewrite descriptors, own sessions
//!   and an optional managed process
//! - **Collections**: compose named adapters and route inbound addresses to them
//! - **Device collections**: attach one adapter per enumerated device and bind a
//!   protocol translator to each session
//! - **Fixtures**: file-backed adapters for exercising the routing without a backend
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │ Collection (root, "")    │  routes /{child}/{rest}
//! └────┬────────────────┬────┘
//!      │                │
//! ┌────▼─────┐   ┌──────▼───────────────┐
//! │ Backend  │   │ Collection ("/ios")  │  DevicePolicy + ProtocolBinder
//! │ "chrome" │   └──────┬───────────────┘
//! └──────────┘   ┌──────▼───────────┐
//!                │ Backend          │  one per device
//!                │ "ios_4a3b"       │
//!                └──────────────────┘
//! ```
//!
//! Public session URLs have the form `{proxy base}{namespace path}/{target id}`.

pub mod adapter;
pub mod address;
pub mod backend;
pub mod bridge;
pub mod collection;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod fixture;
pub mod process;
pub mod rewrite;
pub mod session;
pub mod testing;

pub use adapter::{Adapter, Metadata};
pub use address::{Namespace, parse_address};
pub use backend::{AdapterEvent, BackendAdapter};
pub use bridge::{ClientHandle, Target, TargetConnector, TargetEvent, TargetEvents, WsConnector};
pub use collection::{ChildRegistry, Collection, DiscoveryPolicy, SessionBinder};
pub use config::Timeouts;
pub use device::{
	DeviceCollectionBuilder, FALLBACK_OS_VERSION, ProtocolBinder, ProtocolGeneration, ProxySettings,
	build_proxy_settings, locate_proxy_executable, select_generation,
};
pub use error::{GatewayError, Result};
pub use fixture::FixtureAdapter;
pub use process::{ManagedProcess, ProcessSpec};
pub use session::{Session, SessionId};
