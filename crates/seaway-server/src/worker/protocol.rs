//! Messages exchanged with the worker thread. Plain owned data only.

use seaway_core::{
    BoundingBox, ClassifierStats, GeoPoint, RouteRequest, RouteResult, SourceError,
    WaterClassification,
};

#[derive(Debug)]
pub enum Command {
    FindRoute(RouteRequest),
    Classify(GeoPoint),
    Preload(BoundingBox),
    Stats,
    /// Finish the current queue position and exit.
    Shutdown,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::FindRoute(_) => "find_route",
            Command::Classify(_) => "classify",
            Command::Preload(_) => "preload",
            Command::Stats => "stats",
            Command::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug)]
pub enum Reply {
    Route(RouteResult),
    Classification(WaterClassification),
    Preloaded(Result<usize, SourceError>),
    Stats(ClassifierStats),
}

/// A command tagged with its correlation id.
#[derive(Debug)]
pub struct Envelope {
    pub id: u64,
    pub command: Command,
}

#[derive(Debug)]
pub struct ReplyEnvelope {
    pub id: u64,
    pub reply: Reply,
}
