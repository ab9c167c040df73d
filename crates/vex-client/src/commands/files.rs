use vex_shared::protocol::{kind, Command, Method};
use vex_shared::types::{ChannelId, FileId, FileInfo};

use crate::client::Client;
use crate::error::Result;

/// File uploads. Returned records carry a download URL on the configured
/// host.
pub struct Files<'a> {
    client: &'a Client,
}

impl Client {
    pub fn files(&self) -> Files<'_> {
        Files { client: self }
    }
}

impl Files<'_> {
    pub async fn upload(
        &self,
        data: &[u8],
        file_name: &str,
        channel_id: &ChannelId,
    ) -> Result<FileInfo> {
        let command = Command::new(kind::FILE, Method::Create)
            .field("channelID", channel_id.as_str())
            .field("fileName", file_name)
            .field("file", hex::encode(data));
        let file: FileInfo = self.client.call(command).await?;
        Ok(self.with_url(file))
    }

    pub async fn retrieve(&self, channel_id: &ChannelId) -> Result<Vec<FileInfo>> {
        let command =
            Command::new(kind::FILE, Method::Retrieve).field("channelID", channel_id.as_str());
        let files: Vec<FileInfo> = self.client.call(command).await?;
        Ok(files.into_iter().map(|f| self.with_url(f)).collect())
    }

    pub async fn delete(&self, file_id: &FileId) -> Result<FileInfo> {
        let command = Command::new(kind::FILE, Method::Delete).field("fileID", file_id.as_str());
        let file: FileInfo = self.client.call(command).await?;
        Ok(self.with_url(file))
    }

    fn with_url(&self, mut file: FileInfo) -> FileInfo {
        file.url = self.client.config().file_url(&file.file_id);
        file
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::commands::testing::{connected, reply_success};

    #[tokio::test]
    async fn test_upload_hex_encodes_and_sets_url() {
        let (client, mut server, _listener) = connected().await;

        let upload = tokio::spawn({
            let client = client.clone();
            async move {
                client
                    .files()
                    .upload(b"\x01\xff", "notes.txt", &ChannelId::from("c1"))
                    .await
            }
        });
        let frame = reply_success(&mut server, json!({ "fileID": "f1", "fileName": "notes.txt" })).await;
        assert_eq!(frame["file"], "01ff");
        assert_eq!(frame["fileName"], "notes.txt");

        let file = upload.await.unwrap().unwrap();
        assert_eq!(file.url, "http://chat.test/file/f1");
    }
}
