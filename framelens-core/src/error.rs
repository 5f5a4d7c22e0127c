use snafu::prelude::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FramelensError {
    #[snafu(display("Synthesized source failed to load at `{}`: {}", stage, message))]
    LoadFailure { stage: String, message: String },

    #[snafu(display("Analysis function is not ready: {}", reason))]
    NotReady { reason: String },

    #[snafu(display("Analysis function raised on frame `{}`: {}", frame, message))]
    ExecutionFailure { frame: String, message: String },

    #[snafu(display("Collaborator `{}` request error: {}", service, source))]
    CollaboratorRequest {
        source: reqwest::Error,
        service: String,
    },

    #[snafu(display("Collaborator `{}` returned status {}: {}", service, status, message))]
    CollaboratorStatus {
        service: String,
        status: u16,
        message: String,
    },

    #[snafu(display("Collaborator `{}` response missing `{}`", service, field))]
    CollaboratorResponse { service: String, field: String },

    #[snafu(display("Collaborator `{}` job did not finish within {} polls", service, retries))]
    JobTimedOut { service: String, retries: u32 },

    #[snafu(display("Expected resource not found at `{}`", path))]
    MissingResource { path: String },

    #[snafu(display("Malformed label at `{}` line {}: {}", path, line, message))]
    MalformedLabel {
        path: String,
        line: usize,
        message: String,
    },

    #[snafu(display("Read `{}` error: {}", path, source))]
    IoRead {
        source: std::io::Error,
        path: String,
    },

    #[snafu(display("Write `{}` error: {}", path, source))]
    IoWrite {
        source: std::io::Error,
        path: String,
    },

    #[snafu(display("Json decode at stage `{}` error: {}", stage, source))]
    Json {
        source: serde_json::Error,
        stage: String,
    },

    #[snafu(display("Image `{}` error: {}", path, source))]
    Image {
        source: image::ImageError,
        path: String,
    },

    #[snafu(display("Load font error: {}", source))]
    Font { source: ab_glyph::InvalidFont },

    #[snafu(display("Environment `{}` not found, error {}", name, source))]
    EnvNotFound {
        source: std::env::VarError,
        name: String,
    },

    #[snafu(display("Command `{}` exited with {}", command, status))]
    Command { command: String, status: String },

    #[snafu(display("Spawn `{}` error: {}", command, source))]
    Spawn {
        source: std::io::Error,
        command: String,
    },
}
