pub mod analysis;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// POST /upload                        upload_video
/// GET  /status/{video_id}             get_status
/// GET  /result/{video_id}/video       stream_result_video
/// GET  /result/{video_id}/report      get_report
/// GET  /result/{video_id}/analysis    get_analysis
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(analysis::router())
}
