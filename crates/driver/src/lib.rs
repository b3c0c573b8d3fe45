//! Runs the chain syncer in response to new L1 heads, alongside the periodic protocol status
//! report and the engine transition-configuration exchange.

mod driver;
mod error;
mod event_loop;
mod status;

pub use driver::{Driver, DriverClients, DriverConfig};
pub use error::{DriverError, DriverResult};
pub use status::{report_protocol_status, ProtocolStatus};
