use super::error::ApiResult;
use axum::extract::Multipart;
use bytes::Bytes;
use imgpress_core::Error;
use serde::Deserialize;

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub data: Bytes,
}

/// Compression parameters, accepted as text parts or query parameters.
/// Values are kept raw; the processor applies the lenient defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompressParams {
    pub quality: Option<String>,
    pub format: Option<String>,
    #[serde(alias = "algorithm")]
    pub strategy: Option<String>,
}

impl CompressParams {
    /// Fills parameters missing here from `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            quality: self.quality.or(fallback.quality),
            format: self.format.or(fallback.format),
            strategy: self.strategy.or(fallback.strategy),
        }
    }

    pub fn quality(&self) -> Option<&str> {
        self.quality.as_deref()
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn strategy(&self) -> Option<&str> {
        self.strategy.as_deref()
    }
}

/// A parsed multipart body.
///
/// Parts named `quality`, `format` or `strategy` (alias `algorithm`) are
/// parameters. Every other part that carries a filename, or is named
/// `file`/`files`/`image`/`images`, is an upload.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<Upload>,
    pub params: CompressParams,
}

const FILE_FIELDS: [&str; 4] = ["file", "files", "image", "images"];

impl UploadForm {
    /// Reads the whole body. Fails as soon as a file beyond `max_files`
    /// shows up, before buffering it.
    pub async fn read(mut multipart: Multipart, max_files: usize) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "quality" => form.params.quality = Some(field.text().await?),
                "format" => form.params.format = Some(field.text().await?),
                "strategy" | "algorithm" => form.params.strategy = Some(field.text().await?),
                _ if field.file_name().is_some() || FILE_FIELDS.contains(&name.as_str()) => {
                    if form.files.len() == max_files {
                        return Err(Error::InvalidRequest {
                            reason: format!("Too many files; the maximum is {max_files}"),
                        }
                        .into());
                    }
                    let filename = field
                        .file_name()
                        .filter(|f| !f.is_empty())
                        .map_or_else(|| format!("{name}-{}", form.files.len()), str::to_string);
                    let data = field.bytes().await?;
                    form.files.push(Upload { filename, data });
                }
                _ => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Ignoring multipart field {name:?}");
                }
            }
        }

        Ok(form)
    }

    /// Removes and returns the first upload.
    pub fn take_first(&mut self) -> Option<Upload> {
        (!self.files.is_empty()).then(|| self.files.remove(0))
    }
}
