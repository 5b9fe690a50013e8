//! # Core command protocol
//!
//! Request/response protocol to the kiosk's I/O boards. Each [`CommandType`] has a static
//! descriptor naming its board, literal text, optional status bit and reset sequence.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod command;
mod executor;
mod response;
mod trace;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use command::*;
pub use executor::*;
pub use response::*;
pub use trace::*;
