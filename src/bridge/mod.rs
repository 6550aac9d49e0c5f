//! The bridge core: event dispatch, the membership sync engine, and its
//! collaborators.

pub mod admin;
pub mod engine;
pub mod error;
pub mod events;
pub mod pm;
pub mod provisioner;
pub mod rooms;

pub use admin::{AdminCommand, AdminHandler};
pub use engine::MembershipSyncEngine;
pub use error::BridgeError;
pub use events::{spawn_dispatcher, BridgeEvent, IrcEvent, MatrixEvent};
pub use pm::{PmCoordinator, GROUP_CHAT_UNSUPPORTED};
pub use provisioner::IdentityProvisioner;
pub use rooms::RoomLifecycle;
