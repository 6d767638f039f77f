#![deny(warnings)]

//! Economy engine for an incremental game.
//!
//! [`EconomyEngine`] owns the one live [`EconomyState`] of a session. It
//! applies manual and passive gains, gates and applies upgrade purchases,
//! notifies observers after every change, and persists progress through a
//! [`persistence::SaveStore`] on a debounced schedule. On construction it
//! restores the last snapshot and credits capped offline production.

pub mod clock;
pub mod config;
pub mod economy;
pub mod observer;
pub mod state;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig, DEFAULT_SAVE_DEBOUNCE_MS};
pub use econ::{ManualGain, Stats};
pub use economy::EconomyEngine;
pub use observer::{ObserverRegistry, StateObserver};
pub use state::EconomyState;
pub use timer::SaveTimer;
