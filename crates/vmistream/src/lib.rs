//! Guest-physical memory of a virtual machine as a seekable byte stream.
//!
//! A hypervisor driver opens a [`DriverSession`](memory::traits::DriverSession)
//! on a guest. Two streams sit on top of it:
//!
//! - [`MemoryStream`](memory::stream::MemoryStream): exact reads that may
//!   come back short or fail.
//! - [`PaddedMemoryStream`](memory::padded::PaddedMemoryStream): reads that
//!   always return the requested length, zero-filling unreadable pages.
//!
//! Sessions are opened from `vmi://` URLs (see [`vmiurl`]) through a
//! [`DriverRegistry`](driver::DriverRegistry), either via the single-slot
//! [`VmiHandler`](handler::VmiHandler) or the
//! [`KeyedSessionCache`](handler::KeyedSessionCache).
//!
//! ```rust,no_run
//! use std::io::SeekFrom;
//! use vmistream::handler::VmiHandler;
//!
//! let mut stream = VmiHandler::global()
//!     .handle("vmi://Memflow/?memflow_connector_name=raw&memflow_connector_args=/dumps/guest.raw")?;
//! stream.seek(SeekFrom::Start(0x1000))?;
//! let page = stream.read(4096);
//! assert_eq!(page.len(), 4096);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod driver;
pub mod handler;
pub mod memory;
pub mod plugins;
pub mod server;

pub use driver::{DriverFactory, DriverRegistry};
pub use handler::{HandlerError, KeyedSessionCache, VmiHandler};
pub use memory::error::{DriverError, StreamError};
pub use memory::padded::PaddedMemoryStream;
pub use memory::pause::{with_paused, PauseGuard};
pub use memory::stream::{MemoryStream, PAGE_SIZE};
pub use memory::traits::DriverSession;
