use std::io::Cursor;
use std::path::Path;

use axum::body::Body;
use axum::http::header;
use axum::response::Response;

use crate::error::AppError;

/// Serve a stored file with its guessed content type.
pub(crate) async fn serve_file(path: &Path) -> Result<Response, AppError> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::Internal(format!("IO error: {e}")))?;

    let mime = mime_guess::from_path(path).first_or_octet_stream();

    Response::builder()
        .header(header::CONTENT_TYPE, mime.as_ref())
        .body(Body::from(content))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Serve a stored file as PNG, transcoding when it is not one already.
///
/// Derived outputs are always PNG, so the transcode path only runs for
/// pass-through originals.
pub(crate) async fn serve_png(path: &Path) -> Result<Response, AppError> {
    let is_png = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"));

    let content = if is_png {
        tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Internal(format!("IO error: {e}")))?
    } else {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<Vec<u8>, image::ImageError> {
            let decoded = image::open(&path)?;
            let mut buf = Cursor::new(Vec::new());
            decoded.write_to(&mut buf, image::ImageFormat::Png)?;
            Ok(buf.into_inner())
        })
        .await
        .map_err(|e| AppError::Internal(format!("transcode task failed: {e}")))?
        .map_err(|e| AppError::Internal(format!("PNG transcode failed: {e}")))?
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from(content))
        .map_err(|e| AppError::Internal(e.to_string()))
}
