mod click_monitor;
mod phash;
mod query_parser;
mod search_monitor;
mod search_slot;

pub use click_monitor::{ClickHandler, ClickMonitor, ClickReject};
pub use phash::{compute_phash, hamming_distance};
pub use query_parser::{Candidate, CandidateSource, ParsedQuery, QueryParser};
pub use search_monitor::{PollOutcome, SearchMonitor, SearchPoller};
pub use search_slot::{search_slot, SearchPublisher, SearchReader};
