use axum::{http::StatusCode, response::IntoResponse};

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service name and version", body = String)
    ),
    tag = "aliro"
)]
pub async fn root() -> impl IntoResponse {
    (
        StatusCode::OK,
        concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")),
    )
}
