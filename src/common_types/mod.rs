// Shared types for the revintel multi-agent workflow

pub mod agent_defs;
pub mod error_defs;
pub mod state_defs;
pub mod utils;

pub use agent_defs::*;
pub use error_defs::*;
pub use state_defs::*;
pub use utils::*;
