mod tracker;

pub(crate) use tracker::SESSION_KEY;

pub use tracker::{
    LoadReport, SessionPolicy, SessionState, SleepReport, SleepSessionTracker, StartOutcome,
};
