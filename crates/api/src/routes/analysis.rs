use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{result, status, upload};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload::upload_video))
        .route("/status/{video_id}", get(status::get_status))
        .route("/result/{video_id}/video", get(result::stream_result_video))
        .route("/result/{video_id}/report", get(result::get_report))
        .route("/result/{video_id}/analysis", get(result::get_analysis))
}
