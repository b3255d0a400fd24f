//! # GET /link
//!
//! Presentational page for a freshly issued link. No verification happens
//! here; the URL is only escaped and displayed.

use axum::extract::Query;
use axum::response::Html;
use sharelink_types::LinkQuery;

use crate::pages;

/// GET /link?url=<signed URL>: renders the link for copying.
pub async fn handle_link(Query(query): Query<LinkQuery>) -> Html<String> {
    Html(pages::link_page(&query.url))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::endpoints::test_helpers::{body_string, test_app};

    #[tokio::test]
    async fn test_link_page_renders_decoded_url() {
        let (app, _, _) = test_app();
        let response = app
            .oneshot(
                Request::get("/link?url=https%3A%2F%2Facct.example%2Fshare%2Fa.txt%3Fsp%3Dr%26sig%3Dx")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("https://acct.example/share/a.txt?sp=r&amp;sig=x"));
    }

    #[tokio::test]
    async fn test_link_without_url_is_bad_request() {
        let (app, _, _) = test_app();
        let response = app
            .oneshot(Request::get("/link").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
