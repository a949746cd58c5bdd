use crate::state::AppState;
use axum::extract::State;
use axum::response::Html;

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// No templating engine: the catalog is small and the page is rebuilt on
/// every request, so a plain formatted string is the whole implementation.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let points = state.storage.all().await;

    let mut body = String::from("<html><head><title>metrics</title></head><body><ul>");
    for point in &points {
        if let Some(value) = point.format_value() {
            body.push_str(&format!(
                "<li>{} ({}) = {}</li>",
                escape(&point.id),
                point.kind.as_str(),
                escape(&value)
            ));
        }
    }
    body.push_str("</ul></body></html>");

    Html(body)
}
