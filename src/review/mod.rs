pub mod poller;

pub use poller::{PollHandle, PollOutcome, PollState, ReviewPoller, ReviewUpdate};
