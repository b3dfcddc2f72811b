//! Typed wrappers for the Socket API endpoints used most often.
//!
//! Each wrapper builds an [`ApiRequest`] and hands it to the generic
//! dispatcher on [`SocketClient`]. Responses without a dedicated type are
//! returned as [`serde_json::Value`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use socket_sdk_core::ApiResult;

use crate::ClientError;
use crate::client::SocketClient;
use crate::config::CallOptions;
use crate::request::{ApiRequest, MultipartBody, encode_path_segment};
use crate::response::NdjsonResponse;

/// Remaining API quota of the token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaResponse {
    pub quota: u64,
}

/// One package to look up, identified by its package URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurlComponent {
    pub purl: String,
}

impl PurlComponent {
    pub fn new<S: Into<String>>(purl: S) -> Self {
        Self { purl: purl.into() }
    }
}

impl From<&str> for PurlComponent {
    fn from(purl: &str) -> Self {
        Self::new(purl)
    }
}

/// Query flags for [`SocketClient::batch_package_fetch`].
///
/// Unset flags are left to the server default.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchPackageQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compact: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixable: Option<bool>,
    #[serde(rename = "licenseattrib", skip_serializing_if = "Option::is_none")]
    pub license_attrib: Option<bool>,
    #[serde(rename = "licensedetails", skip_serializing_if = "Option::is_none")]
    pub license_details: Option<bool>,
}

/// Query parameters for [`SocketClient::create_org_full_scan`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FullScanParams {
    pub repo: String,
    pub branch: Option<String>,
    pub commit_message: Option<String>,
    pub commit_hash: Option<String>,
    pub pull_request: Option<u64>,
    pub committers: Option<String>,
    pub integration_type: Option<String>,
    pub integration_org_slug: Option<String>,
    pub make_default_branch: Option<bool>,
    pub set_as_pending_head: Option<bool>,
    pub tmp: Option<bool>,
}

impl FullScanParams {
    pub fn new<S: Into<String>>(repo: S) -> Self {
        Self {
            repo: repo.into(),
            ..Self::default()
        }
    }
}

#[derive(Serialize)]
struct ComponentsBody<'a> {
    components: &'a [PurlComponent],
}

impl SocketClient {
    /// `GET quota`
    pub async fn get_quota(&self) -> Result<ApiResult<QuotaResponse>, ClientError> {
        self.send_json(ApiRequest::get("quota"), CallOptions::new())
            .await
    }

    /// `POST purl`: look up several packages at once.
    ///
    /// The server answers with one JSON document per line, streamed as it
    /// resolves each package.
    pub async fn batch_package_fetch(
        &self,
        components: &[PurlComponent],
        query: &BatchPackageQuery,
    ) -> Result<ApiResult<NdjsonResponse<Value>>, ClientError> {
        let request = ApiRequest::post("purl")
            .query(query)?
            .json(&ComponentsBody { components })?;
        self.send_ndjson(request, CallOptions::new()).await
    }

    /// `GET orgs/{org}/full-scans`
    ///
    /// `query` must serialize to a map; anything else is rejected with
    /// [`ClientError::InvalidRequest`] before the request is sent.
    pub async fn get_org_full_scan_list<Q>(
        &self,
        org: &str,
        query: &Q,
    ) -> Result<ApiResult<Value>, ClientError>
    where
        Q: Serialize + ?Sized,
    {
        let path = format!("orgs/{}/full-scans", encode_path_segment(org));
        let request = ApiRequest::get(path).query(query)?;
        self.send_json(request, CallOptions::new()).await
    }

    /// `GET orgs/{org}/full-scans/{id}`: the scan's artifacts, one per line.
    pub async fn get_org_full_scan(
        &self,
        org: &str,
        scan_id: &str,
    ) -> Result<ApiResult<NdjsonResponse<Value>>, ClientError> {
        let path = format!(
            "orgs/{}/full-scans/{}",
            encode_path_segment(org),
            encode_path_segment(scan_id)
        );
        self.send_ndjson(ApiRequest::get(path), CallOptions::new())
            .await
    }

    /// `POST orgs/{org}/full-scans`: upload manifest files for a new scan.
    ///
    /// Build `files` with [`MultipartForm`](crate::MultipartForm), which
    /// checks every file before anything is sent.
    pub async fn create_org_full_scan(
        &self,
        org: &str,
        params: &FullScanParams,
        files: MultipartBody,
    ) -> Result<ApiResult<Value>, ClientError> {
        let path = format!("orgs/{}/full-scans", encode_path_segment(org));
        let request = ApiRequest::post(path).query(params)?.multipart(files);
        self.send_json(request, CallOptions::new()).await
    }

    /// `DELETE orgs/{org}/full-scans/{id}`
    pub async fn delete_org_full_scan(
        &self,
        org: &str,
        scan_id: &str,
    ) -> Result<ApiResult<Value>, ClientError> {
        let path = format!(
            "orgs/{}/full-scans/{}",
            encode_path_segment(org),
            encode_path_segment(scan_id)
        );
        self.send_json(ApiRequest::delete(path), CallOptions::new())
            .await
    }

    /// `POST dependencies/upload`: create a dependency snapshot from manifests.
    pub async fn create_dependencies_snapshot<Q>(
        &self,
        query: &Q,
        files: MultipartBody,
    ) -> Result<ApiResult<Value>, ClientError>
    where
        Q: Serialize + ?Sized,
    {
        let request = ApiRequest::post("dependencies/upload")
            .query(query)?
            .multipart(files);
        self.send_json(request, CallOptions::new()).await
    }

    /// `PUT orgs/{org}/repos/{repo}`
    pub async fn update_org_repo<B>(
        &self,
        org: &str,
        repo: &str,
        body: &B,
    ) -> Result<ApiResult<Value>, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let path = format!(
            "orgs/{}/repos/{}",
            encode_path_segment(org),
            encode_path_segment(repo)
        );
        let request = ApiRequest::put(path).json(body)?;
        self.send_json(request, CallOptions::new()).await
    }
}
