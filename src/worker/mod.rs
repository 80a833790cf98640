pub mod server;

pub use server::{CalculationServer, PollOutcome};
