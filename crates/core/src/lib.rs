//! Lingo Core
//!
//! Everything that talks to the language model and does not depend on
//! storage: the structured response contracts, the gateway that requests
//! them, prompt loading, the turn state machine and the weakness profile.

pub mod contract;
pub mod gateway;
pub mod prompts;
pub mod turn;
pub mod weakness;
