mod poller;


pub use poller::{PollAgent, PollSettings, PollState};
