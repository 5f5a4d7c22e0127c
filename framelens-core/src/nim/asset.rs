use std::{io::Cursor, path::Path};

use snafu::ResultExt;
use tracing::debug;
use uuid::Uuid;

use crate::{
    consts::ASSETS_URL,
    error::{CollaboratorRequestSnafu, FramelensError, ImageSnafu},
    nim::ensure_success,
};

const SERVICE: &str = "assets";

/// Registers image assets with the inference gateway ahead of an
/// inference call: request an upload URL plus asset id, then PUT the
/// image bytes there.
#[derive(Clone)]
pub struct AssetClient {
    client: reqwest::Client,
    api_key: String,
}

impl AssetClient {
    pub fn new(client: reqwest::Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
        }
    }

    /// Uploads one frame, re-encoded as JPEG regardless of source
    /// format, and returns the asset id the inference request must
    /// reference.
    pub async fn upload_image(
        &self,
        image_path: &Path,
        description: &str,
    ) -> Result<Uuid, FramelensError> {
        let registration = self
            .client
            .post(ASSETS_URL)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&serde_json::json!({
                "contentType": "image/jpeg",
                "description": description,
            }))
            .send()
            .await
            .context(CollaboratorRequestSnafu { service: SERVICE })?;
        let registration = ensure_success(SERVICE, registration).await?;

        let payload: serde_json::Value = registration
            .json()
            .await
            .context(CollaboratorRequestSnafu { service: SERVICE })?;
        let upload_url = field(&payload, "uploadUrl")?;
        let asset_id = field(&payload, "assetId")?;

        let jpeg = encode_jpeg(image_path)?;
        debug!(
            "uploading asset {asset_id} ({} bytes) for {}",
            jpeg.len(),
            image_path.display()
        );

        let upload = self
            .client
            .put(upload_url)
            .header("x-amz-meta-nvcf-asset-description", description)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .await
            .context(CollaboratorRequestSnafu { service: SERVICE })?;
        ensure_success(SERVICE, upload).await?;

        Uuid::parse_str(&asset_id).map_err(|_| FramelensError::CollaboratorResponse {
            service: SERVICE.to_string(),
            field: "assetId".to_string(),
        })
    }
}

fn field(payload: &serde_json::Value, name: &str) -> Result<String, FramelensError> {
    payload
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| FramelensError::CollaboratorResponse {
            service: SERVICE.to_string(),
            field: name.to_string(),
        })
}

fn encode_jpeg(image_path: &Path) -> Result<Vec<u8>, FramelensError> {
    let display = image_path.display().to_string();
    let image = image::open(image_path).context(ImageSnafu {
        path: display.as_str(),
    })?;
    let mut buf = Cursor::new(Vec::new());
    image
        .to_rgb8()
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .context(ImageSnafu {
            path: display.as_str(),
        })?;
    Ok(buf.into_inner())
}
