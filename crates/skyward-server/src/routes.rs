//! HTTP routes over the gateway.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::Arc;

use serde::Serialize;
use skyward_weather::{
    client_id_from_forwarded, CacheStats, EndpointKind, ErrorBody, FetchParams, Gateway,
    GatewayData, GatewayError,
};
use warp::http::header::RETRY_AFTER;
use warp::http::{HeaderValue, StatusCode};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

type Query = HashMap<String, String>;

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    caches: BTreeMap<&'static str, CacheStats>,
}

/// All API routes.
pub fn routes(
    gateway: Arc<Gateway>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let weather = warp::path!("api" / "weather")
        .and(warp::get())
        .and(client_id())
        .and(warp::query::<Query>())
        .and(with_gateway(Arc::clone(&gateway)))
        .and_then(weather_handler);

    let search = warp::path!("api" / "locationSearch")
        .and(warp::get())
        .and(client_id())
        .and(warp::query::<Query>())
        .and(with_gateway(Arc::clone(&gateway)))
        .and_then(|client: String, query: Query, gateway: Arc<Gateway>| async move {
            Ok::<_, Infallible>(serve(&gateway, EndpointKind::Search, &client, query).await)
        });

    let geocode = warp::path!("api" / "reverseGeocode")
        .and(warp::get())
        .and(client_id())
        .and(warp::query::<Query>())
        .and(with_gateway(Arc::clone(&gateway)))
        .and_then(|client: String, query: Query, gateway: Arc<Gateway>| async move {
            Ok::<_, Infallible>(serve(&gateway, EndpointKind::ReverseGeocode, &client, query).await)
        });

    let health = warp::path!("api" / "health")
        .and(warp::get())
        .and(with_gateway(gateway))
        .map(|gateway: Arc<Gateway>| {
            warp::reply::json(&HealthBody {
                status: "ok",
                caches: gateway.cache_stats(),
            })
        });

    weather
        .or(search)
        .or(geocode)
        .or(health)
        .recover(handle_rejection)
}

fn with_gateway(
    gateway: Arc<Gateway>,
) -> impl Filter<Extract = (Arc<Gateway>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&gateway))
}

/// Rate-limit key from `X-Forwarded-For`, or the shared `unknown` bucket.
fn client_id() -> impl Filter<Extract = (String,), Error = Infallible> + Clone {
    warp::header::optional::<String>("x-forwarded-for")
        .map(|header: Option<String>| client_id_from_forwarded(header.as_deref()))
        .or_else(|_| async { Ok::<_, Infallible>((client_id_from_forwarded(None),)) })
}

async fn weather_handler(
    client: String,
    query: Query,
    gateway: Arc<Gateway>,
) -> Result<Response, Infallible> {
    let kind = match query.get("endpoint").map(|e| e.trim()).filter(|e| !e.is_empty()) {
        None => EndpointKind::Current,
        Some(name) => match EndpointKind::from_weather_param(name) {
            Some(kind) => kind,
            None => {
                let err = GatewayError::Validation(format!(
                    "Invalid endpoint '{}', expected current, forecast or history",
                    name
                ));
                return Ok(error_reply(&err));
            }
        },
    };

    Ok(serve(&gateway, kind, &client, query).await)
}

async fn serve(gateway: &Gateway, kind: EndpointKind, client: &str, query: Query) -> Response {
    match gateway.handle(kind, client, &FetchParams::from(query)).await {
        Ok(data) => data_reply(&data),
        Err(err) => error_reply(&err),
    }
}

fn data_reply(data: &GatewayData) -> Response {
    warp::reply::json(data).into_response()
}

/// JSON error body; 429s also carry `Retry-After`.
pub fn error_reply(err: &GatewayError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    } else {
        tracing::debug!("Request rejected: {}", err);
    }

    let mut response = warp::reply::with_status(warp::reply::json(&err.body()), status).into_response();
    if let Some(secs) = err.retry_after() {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else if rejection.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query string")
    } else {
        tracing::warn!("Unhandled rejection: {:?}", rejection);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    let body = ErrorBody {
        error: message.to_string(),
        detail: None,
        retry_after: None,
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}
