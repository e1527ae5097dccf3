//! Upload preparation: every provider receives plain images, so PDF uploads
//! are rasterized page by page before the prompt is sent.

use image::{DynamicImage, ImageFormat};
use pdf2image::{PDF, Pages};
use std::io::Cursor;
use tracing::info;

use crate::error::{ExtractionError, Result};
use crate::models::{ImageAttachment, MediaType};

/// Expand PDFs into PNG pages and pass images through untouched, keeping upload order.
pub async fn prepare_images(images: &[ImageAttachment]) -> Result<Vec<ImageAttachment>> {
    let mut prepared = Vec::with_capacity(images.len());

    for attachment in images {
        if attachment.media_type.is_image() {
            prepared.push(attachment.clone());
            continue;
        }

        let pages = rasterize_pdf(attachment.data.clone()).await?;
        info!(
            file_name = ?attachment.file_name,
            pages = pages.len(),
            "Rasterized PDF upload"
        );

        let stem = attachment.file_name.clone().unwrap_or_else(|| "document.pdf".to_string());
        for (i, page) in pages.into_iter().enumerate() {
            prepared.push(
                ImageAttachment::new(page, MediaType::Png)
                    .with_file_name(format!("{} (page {})", stem, i + 1)),
            );
        }
    }

    Ok(prepared)
}

async fn rasterize_pdf(data: Vec<u8>) -> Result<Vec<Vec<u8>>> {
    let pages = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<u8>>> {
        let pdf = PDF::from_bytes(data)
            .map_err(|e| ExtractionError::Media(format!("Failed to load PDF: {}", e)))?;

        let rendered = pdf
            .render(Pages::All, None)
            .map_err(|e| ExtractionError::Media(format!("Failed to render PDF pages: {}", e)))?;

        rendered.iter().map(encode_png).collect()
    })
    .await
    .map_err(|e| ExtractionError::Media(format!("PDF rendering task failed: {}", e)))??;

    if pages.is_empty() {
        return Err(ExtractionError::Media("No pages rendered from PDF".to_string()));
    }
    Ok(pages)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| ExtractionError::Media(format!("Failed to encode image: {}", e)))?;
    Ok(buffer)
}
