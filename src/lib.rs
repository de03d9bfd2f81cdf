//! MiningHQ Miner Manager installation library.
//!
//! The core is the [`Installer`]: a cross-platform install/uninstall engine
//! for the MiningHQ rig monitoring services. Front ends (the headless CLI in
//! this crate, a desktop GUI elsewhere) construct one installer and invoke
//! its two lifecycle operations, differing only in how progress and errors
//! are surfaced.

pub mod cli;
pub mod config;
pub mod error;
pub mod installer;
pub mod orchestration;

pub use error::InstallerError;
pub use installer::Installer;
