//! Live Panel session: a registry of displayed items kept in sync with every
//! connected viewer.
//!
//! ```no_run
//! use livepanel_core::config::Config;
//! use livepanel_core::ObservableList;
//! use livepanel_session::Session;
//!
//! let session = Session::new(&Config::default());
//! let readings = ObservableList::empty(session.bus());
//! session.add(readings.clone());
//! session.run().unwrap();
//! readings.push(42);
//! ```

pub mod events;
pub mod registry;
pub mod session;
pub mod window;

#[cfg(test)]
mod testing;

pub use events::EventQueue;
pub use registry::{ItemRef, Registry};
pub use session::Session;
pub use window::WindowState;
