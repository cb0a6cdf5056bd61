//! Relocatable ELF plugin loader.
//!
//! This library loads a relocatable ELF32 object (a plugin implementing a game
//! engine or backend module) into a runtime-allocated memory region and patches
//! every address-dependent word so the code executes correctly from its new
//! location. It is organized into several modules:
//! - `image`: Ownership of the raw object bytes and bounds-checked reads.
//! - `parser`: Header validation and section-table indexing.
//! - `segment`: Runtime memory allocation and section copying.
//! - `symbol`: Symbol-table parsing and host-export resolution.
//! - `arch`: Architecture-specific relocation strategies.
//! - `loader`: Load orchestration and the resulting `Plugin` handle.
//!
//! The load is synchronous and transactional: any failure unwinds every
//! allocation made so far and yields no `Plugin` at all.

pub mod arch;
pub mod error;
pub mod image;
pub mod loader;
pub mod parser;
pub mod segment;
pub mod symbol;
pub mod utils;

pub use error::{LoadError, Severity};
pub use image::ObjectImage;
pub use loader::{Loader, Plugin};
pub use symbol::ExportTable;

/// A type alias for `Result`s returned by `plugload` functions.
pub type Result<T> = core::result::Result<T, LoadError>;
