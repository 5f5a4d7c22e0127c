pub mod asset;
pub mod llm;
pub mod poll;
pub mod vision;

use crate::error::FramelensError;

/// Maps a non-success collaborator response to a status failure with
/// whatever body text the service returned.
pub(crate) async fn ensure_success(
    service: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, FramelensError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let message = response.text().await.unwrap_or_default();
        Err(FramelensError::CollaboratorStatus {
            service: service.to_string(),
            status: status.as_u16(),
            message,
        })
    }
}
