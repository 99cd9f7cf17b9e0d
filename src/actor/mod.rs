mod client;
mod root;
pub(crate) mod messages;

pub(crate) use root::{Root, RootArgs};
pub(crate) use messages::{
    CreateClient, GetCurrent, GetRecentHistory, GetStats, InstallSnapshot, SaveState,
};
pub use messages::Stats;
