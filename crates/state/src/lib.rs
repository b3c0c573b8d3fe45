//! Shared view of the L1 and L2 chain heads and the L1 replay cursor.

mod error;
mod head_state;

pub use error::{StateError, StateResult};
pub use head_state::HeadState;
