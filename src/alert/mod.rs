pub mod audio;
pub mod controller;

pub use controller::{
    AlertController, AlertEffect, AlertSnapshot, AlertState, ReactionOutcome, ReactionReport,
    SessionId,
};
