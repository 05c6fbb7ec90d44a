/// One generated binary output (image or video bytes)
#[derive(Debug, Clone)]
pub struct Artifact {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl Artifact {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// Get the appropriate file extension for this artifact
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "video/mp4" => "mp4",
            "video/webm" => "webm",
            "video/quicktime" => "mov",
            m if m.starts_with("video/") => "mp4",
            _ => "png",
        }
    }
}
