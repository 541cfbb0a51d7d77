//! Hardware abstraction layer for the evaluation board link
//!
//! The session talks to the board through `DatagramTransport`; UDP is the
//! production implementation and the mock scripts a simulated board.

pub mod transport;
pub mod udp;
pub mod mock;
pub mod error;

pub use transport::{DatagramTransport, TransportStatus};
pub use udp::UdpTransport;
pub use mock::{MockTransport, SimulatedBoard};
pub use error::{TransportError, TransportResult};
