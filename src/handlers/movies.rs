use super::read_id;
use crate::api::json::{read_csv, read_int, read_json, read_string, write_json};
use crate::api::{BoxBody, Call};
use crate::data::movies::{validate_filter, validate_movie};
use crate::data::{with_deadline, Movie, MovieFilter, Runtime};
use crate::error::ApiError;
use crate::server::AppState;
use crate::validator::Validator;
use http::header::LOCATION;
use http::{HeaderValue, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CreateMovie {
    title: String,
    year: i32,
    runtime: Runtime,
    genres: Vec<String>,
}

/// Partial update: absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct UpdateMovie {
    title: Option<String>,
    year: Option<i32>,
    runtime: Option<Runtime>,
    genres: Option<Vec<String>>,
}

pub async fn create(state: AppState, call: Call) -> Result<Response<BoxBody>, ApiError> {
    let input: CreateMovie = read_json(&call.body)?;
    let movie = Movie::new(input.title, input.year, input.runtime, input.genres);

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    v.finish()?;

    let timeout = state.config.auth.store_timeout;
    let movie = with_deadline(timeout, state.models.movies.insert(movie)).await?;

    let location = HeaderValue::from_str(&format!("/v1/movies/{}", movie.id))
        .map_err(ApiError::server_fault)?;
    let mut resp = write_json(StatusCode::CREATED, &json!({ "movie": movie }))?;
    resp.headers_mut().insert(LOCATION, location);
    Ok(resp)
}

pub async fn show(state: AppState, call: Call) -> Result<Response<BoxBody>, ApiError> {
    let id = read_id(&call)?;
    let timeout = state.config.auth.store_timeout;
    let movie = with_deadline(timeout, state.models.movies.get(id)).await?;
    write_json(StatusCode::OK, &json!({ "movie": movie }))
}

pub async fn update(state: AppState, call: Call) -> Result<Response<BoxBody>, ApiError> {
    let id = read_id(&call)?;
    let timeout = state.config.auth.store_timeout;
    let mut movie = with_deadline(timeout, state.models.movies.get(id)).await?;

    let input: UpdateMovie = read_json(&call.body)?;
    if let Some(title) = input.title {
        movie.title = title;
    }
    if let Some(year) = input.year {
        movie.year = year;
    }
    if let Some(runtime) = input.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = input.genres {
        movie.genres = genres;
    }

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    v.finish()?;

    // The store rejects the write if the version moved since `get`.
    let movie = with_deadline(timeout, state.models.movies.update(movie)).await?;
    write_json(StatusCode::OK, &json!({ "movie": movie }))
}

pub async fn delete(state: AppState, call: Call) -> Result<Response<BoxBody>, ApiError> {
    let id = read_id(&call)?;
    let timeout = state.config.auth.store_timeout;
    with_deadline(timeout, state.models.movies.delete(id)).await?;
    write_json(
        StatusCode::OK,
        &json!({ "message": "movie successfully deleted" }),
    )
}

pub async fn list(state: AppState, call: Call) -> Result<Response<BoxBody>, ApiError> {
    let mut v = Validator::new();
    let defaults = MovieFilter::default();
    let filter = MovieFilter {
        title: read_string(&call.query, "title", ""),
        genres: read_csv(&call.query, "genres", &[]),
        page: read_int(&call.query, "page", defaults.page, &mut v),
        page_size: read_int(&call.query, "page_size", defaults.page_size, &mut v),
    };
    validate_filter(&mut v, &filter);
    v.finish()?;

    let timeout = state.config.auth.store_timeout;
    let movies = with_deadline(timeout, state.models.movies.list(&filter)).await?;
    write_json(
        StatusCode::OK,
        &json!({
            "movies": movies,
            "metadata": {
                "current_page": filter.page,
                "page_size": filter.page_size,
            },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Principal, RequestContext};
    use crate::config::ApiConfig;
    use crate::data::Models;
    use crate::routing::Params;
    use bytes::Bytes;
    use http::Method;
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use tokio::time::Instant;

    fn state() -> AppState {
        AppState::new(ApiConfig::default(), Models::in_memory())
    }

    fn call(params: &[(&str, &str)], query: &[(&str, &str)], body: &str) -> Call {
        Call {
            ctx: RequestContext::new(
                Method::GET,
                "/v1/movies".to_string(),
                "127.0.0.1".to_string(),
                Principal::Anonymous,
                Instant::now(),
            ),
            params: Params::from_pairs(params),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            body: Bytes::from(body.to_string()),
        }
    }

    async fn body_json(resp: Response<BoxBody>) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    const MOANA: &str =
        r#"{"title":"Moana","year":2016,"runtime":"107 mins","genres":["animation","adventure"]}"#;

    #[tokio::test]
    async fn create_sets_location_and_version() {
        let s = state();
        let resp = create(s.clone(), call(&[], &[], MOANA)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers().get(LOCATION).unwrap(), "/v1/movies/1");
        let v = body_json(resp).await;
        assert_eq!(v["movie"]["runtime"], "107 mins");
        assert_eq!(v["movie"]["version"], 1);
    }

    #[tokio::test]
    async fn create_rejects_invalid_movie() {
        let err = create(state(), call(&[], &[], r#"{"title":"","year":1500}"#))
            .await
            .unwrap_err();
        match err {
            ApiError::FailedValidation(errors) => {
                assert_eq!(errors["title"], "must be provided");
                assert_eq!(errors["year"], "must be greater than 1888");
                assert!(errors.contains_key("runtime"));
                assert!(errors.contains_key("genres"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn create_rejects_unknown_field() {
        let err = create(state(), call(&[], &[], r#"{"title":"x","rating":5}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("rating")));
    }

    #[tokio::test]
    async fn partial_update_bumps_version() {
        let s = state();
        create(s.clone(), call(&[], &[], MOANA)).await.unwrap();

        let resp = update(s.clone(), call(&[("id", "1")], &[], r#"{"year":2017}"#))
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["movie"]["year"], 2017);
        assert_eq!(v["movie"]["title"], "Moana");
        assert_eq!(v["movie"]["version"], 2);
    }

    #[tokio::test]
    async fn missing_movie_is_not_found() {
        let s = state();
        let err = show(s.clone(), call(&[("id", "9")], &[], "")).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
        let err = delete(s, call(&[("id", "9")], &[], "")).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn delete_then_show() {
        let s = state();
        create(s.clone(), call(&[], &[], MOANA)).await.unwrap();
        let resp = delete(s.clone(), call(&[("id", "1")], &[], "")).await.unwrap();
        assert_eq!(body_json(resp).await["message"], "movie successfully deleted");
        assert!(show(s, call(&[("id", "1")], &[], "")).await.is_err());
    }

    #[tokio::test]
    async fn list_filters_and_validates() {
        let s = state();
        create(s.clone(), call(&[], &[], MOANA)).await.unwrap();
        create(
            s.clone(),
            call(
                &[],
                &[],
                r#"{"title":"Heat","year":1995,"runtime":"170 mins","genres":["crime"]}"#,
            ),
        )
        .await
        .unwrap();

        let resp = list(s.clone(), call(&[], &[("genres", "crime")], ""))
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["movies"].as_array().unwrap().len(), 1);
        assert_eq!(v["movies"][0]["title"], "Heat");

        let err = list(s, call(&[], &[("page", "x"), ("page_size", "500")], ""))
            .await
            .unwrap_err();
        match err {
            ApiError::FailedValidation(errors) => {
                assert_eq!(errors["page"], "must be an integer value");
                assert_eq!(errors["page_size"], "must be a maximum of 100");
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }
}
