//! Catalog client resolving identifiers and etags through an [IdentifierCache].

use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use reqwest::blocking::{RequestBuilder, Response};
use reqwest::header::{self, HeaderMap};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::cache::IdentifierCache;
use crate::config::CatalogClientConfig;
use crate::error::{CatalogClientError, classify};
use crate::types::{CreatedFile, FileList, FileRef, Metadata, Selector};

/// The file catalog API.
///
/// Implemented over HTTP by [CatalogClient],
/// alternate implementations can stand in for it in tests.
pub trait FileCatalog {
    /// List records matching `query`, a JSON object.
    fn list(
        &mut self,
        query: &Value,
        start: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Metadata, CatalogClientError>;

    /// Read a single record.
    fn get(&mut self, file: &FileRef) -> Result<Metadata, CatalogClientError>;

    /// Create a record, or add a replica to an existing one.
    fn create(&mut self, metadata: &Metadata) -> Result<Metadata, CatalogClientError>;

    /// Patch the fields in `metadata` into a record.
    fn update(
        &mut self,
        file: &FileRef,
        metadata: &Metadata,
        clear_cache: bool,
    ) -> Result<Metadata, CatalogClientError>;

    /// Replace a record's metadata with `metadata`.
    fn replace(
        &mut self,
        file: &FileRef,
        metadata: &Metadata,
        clear_cache: bool,
    ) -> Result<Metadata, CatalogClientError>;

    fn delete(&mut self, file: &FileRef) -> Result<(), CatalogClientError>;
}

/// A blocking client for the file catalog.
///
/// Every operation takes `&mut self` because it may update the cache.
/// To share a client between threads, wrap it in a `Mutex`.
pub struct CatalogClient {
    http_client: reqwest::blocking::Client,
    base_url: Url,
    cache: IdentifierCache,
}

impl Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    /// Create a new catalog client from configuration.
    pub fn new(config: CatalogClientConfig) -> Result<Self, CatalogClientError> {
        let base_url = api_base_url(&config)?;
        let http_client = build_http_client(&config)?;

        debug!(%base_url, "created catalog client");

        Ok(Self {
            http_client,
            base_url,
            cache: IdentifierCache::new(),
        })
    }

    /// The `<url>[:<port>]/api` base all endpoints are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn cache(&self) -> &IdentifierCache {
        &self.cache
    }

    /// Forget all cached identifiers and etags.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// `<base>/files` or `<base>/files/<mongo_id>`
    fn files_url(&self, mongo_id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        {
            // base_url is checked to be a base in `api_base_url`
            let mut segments = url
                .path_segments_mut()
                .expect("catalog base url can be a base");
            segments.push("files");
            if let Some(mongo_id) = mongo_id {
                segments.push(mongo_id);
            }
        }
        url
    }

    fn send(
        &self,
        method: Method,
        url: &Url,
        request: RequestBuilder,
    ) -> Result<Response, CatalogClientError> {
        debug!(%method, %url, "sending request");
        request
            .send()
            .map_err(|e| CatalogClientError::request(method, url.as_str(), e))
    }

    /// Resolve a [FileRef] to a `mongo_id`.
    ///
    /// A `uid` is looked up in the cache first,
    /// on a miss a listing filtered by `uid` populates the cache.
    fn resolve_mongo_id(&mut self, file: &FileRef) -> Result<String, CatalogClientError> {
        let uid = match Selector::try_from(file)? {
            Selector::MongoId(mongo_id) => return Ok(mongo_id.to_string()),
            Selector::Uid(uid) => uid,
        };

        if self.cache.has_mongo_id(uid) {
            debug!(%uid, "mongo_id cache hit");
            return Ok(self.cache.get_mongo_id(uid)?.to_string());
        }

        debug!(%uid, "mongo_id cache miss, querying catalog");
        self.list(&serde_json::json!({ "uid": uid }), None, None)?;

        if self.cache.has_mongo_id(uid) {
            Ok(self.cache.get_mongo_id(uid)?.to_string())
        } else {
            Err(CatalogClientError::UidNotFound(uid.to_string()))
        }
    }

    /// Store the etag of a successful response for `mongo_id`.
    ///
    /// The server has to send an etag with every record it returns.
    fn cache_etag(
        &mut self,
        mongo_id: &str,
        response: &Response,
    ) -> Result<(), CatalogClientError> {
        let etag = response
            .headers()
            .get(header::ETAG)
            .ok_or_else(|| {
                CatalogClientError::ProtocolViolation(format!(
                    "the server responded without an etag for '{mongo_id}'"
                ))
            })?
            .to_str()
            .map_err(|_| {
                CatalogClientError::ProtocolViolation(format!(
                    "the server responded with a non-ASCII etag for '{mongo_id}'"
                ))
            })?;

        self.cache.set_etag(mongo_id, etag);
        Ok(())
    }

    /// The etag to send with a conditional write to `mongo_id`.
    ///
    /// Falls back to fetching the record, which caches its etag.
    fn resolve_etag(&mut self, mongo_id: &str) -> Result<String, CatalogClientError> {
        if self.cache.has_etag(mongo_id) {
            debug!(%mongo_id, "etag cache hit");
            return Ok(self.cache.get_etag(mongo_id)?.to_string());
        }

        debug!(%mongo_id, "etag cache miss, fetching record");
        self.get(&FileRef::mongo_id(mongo_id))?;

        if self.cache.has_etag(mongo_id) {
            Ok(self.cache.get_etag(mongo_id)?.to_string())
        } else {
            Err(CatalogClientError::InvariantViolation(format!(
                "could not update '{mongo_id}' because its etag is unknown"
            )))
        }
    }

    /// Shared implementation of [FileCatalog::update] (PATCH)
    /// and [FileCatalog::replace] (PUT).
    fn update_or_replace(
        &mut self,
        method: Method,
        file: &FileRef,
        metadata: &Metadata,
        clear_cache: bool,
    ) -> Result<Metadata, CatalogClientError> {
        let mongo_id = self.resolve_mongo_id(file)?;

        if metadata.is_empty() {
            return Err(CatalogClientError::InvalidArgument(
                "no metadata has been passed to update the file".to_string(),
            ));
        }

        if clear_cache && self.cache.has_etag(&mongo_id) {
            self.cache.delete_etag(&mongo_id)?;
        }

        let etag = self.resolve_etag(&mongo_id)?;

        let url = self.files_url(Some(&mongo_id));
        let request = self
            .http_client
            .request(method.clone(), url.clone())
            .header(header::IF_NONE_MATCH, etag)
            .json(metadata);
        let response = self.send(method.clone(), &url, request)?;

        if response.status() != StatusCode::OK {
            return Err(error_response(method, &url, response));
        }

        self.cache_etag(&mongo_id, &response)?;
        decode_object(method, &url, response)
    }
}

impl FileCatalog for CatalogClient {
    #[instrument(skip_all, fields(start = ?start, limit = ?limit))]
    fn list(
        &mut self,
        query: &Value,
        start: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Metadata, CatalogClientError> {
        let Some(query_object) = query.as_object() else {
            return Err(CatalogClientError::InvalidArgument(
                "`query` must be a JSON object".to_string(),
            ));
        };

        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(start) = start {
            params.push(("start", start.to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        if !query_object.is_empty() {
            let encoded = serde_json::to_string(query).map_err(CatalogClientError::Encode)?;
            params.push(("query", encoded));
        }

        let url = self.files_url(None);
        let request = self.http_client.get(url.clone()).query(&params);
        let response = self.send(Method::GET, &url, request)?;

        if response.status() != StatusCode::OK {
            return Err(error_response(Method::GET, &url, response));
        }

        let page = decode_object(Method::GET, &url, response)?;
        let files = FileList::from_page(&page).ok_or_else(|| {
            CatalogClientError::ProtocolViolation(
                "file listing has no `_embedded.files` array".to_string(),
            )
        })?;

        for (uid, mongo_id) in files.id_pairs() {
            self.cache.set_mongo_id(uid, mongo_id);
        }

        Ok(page)
    }

    #[instrument(skip_all, fields(mongo_id = ?file.mongo_id, uid = ?file.uid))]
    fn get(&mut self, file: &FileRef) -> Result<Metadata, CatalogClientError> {
        let mongo_id = self.resolve_mongo_id(file)?;

        let url = self.files_url(Some(&mongo_id));
        let request = self.http_client.get(url.clone());
        let response = self.send(Method::GET, &url, request)?;

        if response.status() != StatusCode::OK {
            return Err(error_response(Method::GET, &url, response));
        }

        self.cache_etag(&mongo_id, &response)?;
        decode_object(Method::GET, &url, response)
    }

    #[instrument(skip_all, fields(uid = ?metadata.get("uid")))]
    fn create(&mut self, metadata: &Metadata) -> Result<Metadata, CatalogClientError> {
        let url = self.files_url(None);
        let request = self.http_client.post(url.clone()).json(metadata);
        let response = self.send(Method::POST, &url, request)?;

        match response.status() {
            StatusCode::CREATED => {
                let body = decode_object(Method::POST, &url, response)?;
                let created = CreatedFile::from_body(&body).ok_or_else(|| {
                    CatalogClientError::ProtocolViolation(
                        "creation response has no `file` path".to_string(),
                    )
                })?;
                let mongo_id = created.mongo_id().ok_or_else(|| {
                    CatalogClientError::ProtocolViolation(format!(
                        "creation response names no resource: '{}'",
                        created.file
                    ))
                })?;

                match metadata.get("uid").and_then(Value::as_str) {
                    Some(uid) => self.cache.set_mongo_id(uid, mongo_id),
                    None => debug!(%mongo_id, "created file has no uid, nothing to cache"),
                }

                Ok(body)
            },
            // a replica was added to an existing file
            StatusCode::OK => decode_object(Method::POST, &url, response),
            _ => Err(error_response(Method::POST, &url, response)),
        }
    }

    #[instrument(skip_all, fields(mongo_id = ?file.mongo_id, uid = ?file.uid, clear_cache = clear_cache))]
    fn update(
        &mut self,
        file: &FileRef,
        metadata: &Metadata,
        clear_cache: bool,
    ) -> Result<Metadata, CatalogClientError> {
        self.update_or_replace(Method::PATCH, file, metadata, clear_cache)
    }

    #[instrument(skip_all, fields(mongo_id = ?file.mongo_id, uid = ?file.uid, clear_cache = clear_cache))]
    fn replace(
        &mut self,
        file: &FileRef,
        metadata: &Metadata,
        clear_cache: bool,
    ) -> Result<Metadata, CatalogClientError> {
        self.update_or_replace(Method::PUT, file, metadata, clear_cache)
    }

    #[instrument(skip_all, fields(mongo_id = ?file.mongo_id, uid = ?file.uid))]
    fn delete(&mut self, file: &FileRef) -> Result<(), CatalogClientError> {
        let mongo_id = self.resolve_mongo_id(file)?;

        let url = self.files_url(Some(&mongo_id));
        let request = self.http_client.delete(url.clone());
        let response = self.send(Method::DELETE, &url, request)?;

        if response.status() != StatusCode::NO_CONTENT {
            return Err(error_response(Method::DELETE, &url, response));
        }

        self.cache.clear_by_mongo_id(&mongo_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Decode a successful response body as a JSON object.
fn decode_object(
    method: Method,
    url: &Url,
    response: Response,
) -> Result<Metadata, CatalogClientError> {
    let body = response
        .json::<Value>()
        .map_err(|e| CatalogClientError::decode(method, url.as_str(), e))?;

    match body {
        Value::Object(object) => Ok(object),
        other => Err(CatalogClientError::ProtocolViolation(format!(
            "expected a JSON object in the response, found: {other}"
        ))),
    }
}

/// Classify an unsuccessful response.
fn error_response(method: Method, url: &Url, response: Response) -> CatalogClientError {
    let code = response.status().as_u16();
    match response.text() {
        Ok(body) => {
            debug!(%method, %url, code, "catalog returned an error");
            classify(code, &body).into()
        },
        Err(e) => CatalogClientError::decode(method, url.as_str(), e),
    }
}

/// Build `<catalog_url>[:<port>]/api`.
fn api_base_url(config: &CatalogClientConfig) -> Result<Url, CatalogClientError> {
    let authority = config.authority_url();
    let invalid = |source| CatalogClientError::InvalidUrl {
        url: authority.clone(),
        source,
    };

    let mut url = Url::parse(&authority).map_err(invalid)?;
    url.path_segments_mut()
        .map_err(|_| invalid(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .push("api");
    Ok(url)
}

// ---------------------------------------------------------------------------
// HTTP client builder
// ---------------------------------------------------------------------------

fn build_http_client(
    config: &CatalogClientConfig,
) -> Result<reqwest::blocking::Client, CatalogClientError> {
    let mut headers = HeaderMap::new();

    for (key, value) in &config.extra_headers {
        headers.insert(
            header::HeaderName::from_str(key).map_err(
                |e: reqwest::header::InvalidHeaderName| {
                    CatalogClientError::BuildClient(e.to_string())
                },
            )?,
            header::HeaderValue::from_str(value).map_err(
                |e: reqwest::header::InvalidHeaderValue| {
                    CatalogClientError::BuildClient(e.to_string())
                },
            )?,
        );
    }

    debug!(
        catalog_url = %config.catalog_url,
        port = ?config.port,
        reuse_connections = config.reuse_connections,
        extra_headers = config.extra_headers.len(),
        "building catalog HTTP client"
    );

    let mut client_builder = reqwest::blocking::Client::builder().default_headers(headers);

    if let Some(secs) = config.connect_timeout_secs {
        client_builder = client_builder.connect_timeout(Duration::from_secs(secs));
    }
    // the blocking client defaults to a 30s timeout, `None` lifts it
    client_builder = client_builder.timeout(config.timeout_secs.map(Duration::from_secs));

    if !config.reuse_connections {
        client_builder = client_builder.pool_max_idle_per_host(0);
    }

    if let Some(ref user_agent) = config.user_agent {
        client_builder = client_builder.user_agent(user_agent);
    }

    client_builder
        .build()
        .map_err(|e| CatalogClientError::BuildClient(e.to_string()))
}
