#[macro_use]
extern crate serde;

mod anchor;
mod audit;
mod ballot;
mod clock;
mod credential;
mod crypto;
mod election;
mod elgamal;
mod error;
mod events;
mod merkle;
mod mixnet;
mod participant;
mod serde_hex;
mod store;
mod tally;
mod threshold;
mod voting;
mod zkproof;

pub use anchor::*;
pub use audit::*;
pub use ballot::*;
pub use clock::*;
pub use credential::*;
pub use crypto::*;
pub use election::*;
pub use elgamal::*;
pub use error::*;
pub use events::*;
pub use merkle::*;
pub use mixnet::*;
pub use participant::*;
pub use serde_hex::*;
pub use store::*;
pub use tally::*;
pub use threshold::*;
pub use voting::*;
pub use zkproof::*;
