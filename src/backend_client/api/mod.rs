mod responses;

pub use responses::{InstructionsResponse, ReleaseInfo, TriggerResponse, VersionCheckResponse};
