use std::collections::HashMap;

use axum::{
    extract::Multipart,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tokio::net::TcpListener;

type StringMap = HashMap<String, String>;

pub fn app() -> Router {
    Router::new()
        .route("/status", post(status))
        .route("/echo", post(echo))
        .route("/events", post(events))
        .route("/upload", post(upload))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn status() -> Json<StringMap> {
    let mut map = StringMap::new();
    map.insert("status".to_string(), "ok".to_string());
    Json(map)
}

/// Echo the form body back as a JSON string map.
///
/// The client under test joins raw `key=value` pairs with `&` and does
/// not percent-encode, so the body is split the same way rather than
/// run through a urlencoded deserializer.
async fn echo(body: String) -> Json<StringMap> {
    let fields: StringMap = body
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Json(fields)
}

async fn events() -> Json<Vec<StringMap>> {
    let event = |id: &str, kind: &str| {
        let mut map = StringMap::new();
        map.insert("id".to_string(), id.to_string());
        map.insert("kind".to_string(), kind.to_string());
        map
    };
    Json(vec![event("1", "created"), event("2", "updated")])
}

/// Accept a multipart upload: echo text fields, report each file part's
/// size under `{name}_bytes`, and count the file parts.
async fn upload(mut multipart: Multipart) -> Result<Json<StringMap>, StatusCode> {
    let mut response = StringMap::new();
    let mut files = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().unwrap_or_default().to_string();
        if field.file_name().is_some() {
            let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
            response.insert(format!("{name}_bytes"), bytes.len().to_string());
            files += 1;
        } else {
            let value = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
            response.insert(name, value);
        }
    }

    response.insert("received_images".to_string(), files.to_string());
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_splits_raw_pairs() {
        let Json(fields) = echo("a=1&b=2".to_string()).await;
        assert_eq!(fields.get("a").unwrap(), "1");
        assert_eq!(fields.get("b").unwrap(), "2");
    }

    #[tokio::test]
    async fn echo_keeps_unescaped_values() {
        let Json(fields) = echo("q=a b+c".to_string()).await;
        assert_eq!(fields.get("q").unwrap(), "a b+c");
    }

    #[tokio::test]
    async fn status_reports_ok() {
        let Json(map) = status().await;
        assert_eq!(map.get("status").unwrap(), "ok");
    }

    #[tokio::test]
    async fn events_returns_string_maps_in_order() {
        let Json(list) = events().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].get("id").unwrap(), "1");
        assert_eq!(list[1].get("kind").unwrap(), "updated");
    }
}
