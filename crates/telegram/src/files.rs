//! Telegram file retrieval.

use teloxide::prelude::*;

use crate::error::{Error, Result};

/// Fetches the raw bytes of a Telegram file by id.
///
/// Resolves the file path with `getFile`, then downloads it from the file
/// endpoint: `<api-url>/file/bot<token>/<file_path>`.
pub async fn download_file(bot: &Bot, file_id: &str) -> Result<Vec<u8>> {
    let file = bot.get_file(file_id).await?;

    let url = format!("{}file/bot{}/{}", bot.api_url(), bot.token(), file.path);
    let response = reqwest::get(&url).await?;
    if !response.status().is_success() {
        return Err(Error::message(format!(
            "file download failed: HTTP {}",
            response.status()
        )));
    }
    Ok(response.bytes().await?.to_vec())
}
